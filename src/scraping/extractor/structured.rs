//! JSON-LD product metadata

use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

use super::price::parse_price;
use super::types::ExtractionError;

/// Keys that may carry the offer price, in preference order
const OFFER_PRICE_KEYS: &[&str] = &["price", "lowPrice"];

/// Price from the first JSON-LD block that yields a positive offer price
///
/// Malformed blocks are skipped.
pub fn json_ld_price(document: &Html) -> Result<Option<f64>, ExtractionError> {
    let selector = match Selector::parse("script[type='application/ld+json']") {
        Ok(s) => s,
        Err(_) => return Ok(None),
    };

    for script in document.select(&selector) {
        let json_text = script.text().collect::<String>();
        let value = match serde_json::from_str::<Value>(&json_text) {
            Ok(v) => v,
            Err(e) => {
                debug!("Skipping malformed JSON-LD block: {}", e);
                continue;
            }
        };

        if let Some(price) = product_offer_price(&value) {
            return Ok(Some(price));
        }
    }

    Ok(None)
}

/// Product name from JSON-LD, used as a title fallback
pub fn json_ld_name(document: &Html) -> Option<String> {
    let selector = Selector::parse("script[type='application/ld+json']").ok()?;

    document.select(&selector).find_map(|script| {
        let value = serde_json::from_str::<Value>(&script.text().collect::<String>()).ok()?;
        product_name(&value)
    })
}

/// Walk a JSON-LD value looking for `offers`, directly or inside `@graph` / arrays
fn product_offer_price(value: &Value) -> Option<f64> {
    match value {
        Value::Array(items) => items.iter().find_map(product_offer_price),
        Value::Object(map) => map
            .get("offers")
            .and_then(offer_price)
            .or_else(|| map.get("@graph").and_then(product_offer_price)),
        _ => None,
    }
}

fn offer_price(offers: &Value) -> Option<f64> {
    match offers {
        Value::Array(items) => items.iter().find_map(offer_price),
        Value::Object(map) => OFFER_PRICE_KEYS
            .iter()
            .filter_map(|key| map.get(*key))
            .chain(map.get("priceSpecification").and_then(|s| s.get("price")))
            .filter_map(positive_number)
            .next(),
        _ => None,
    }
}

fn positive_number(value: &Value) -> Option<f64> {
    let price = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => parse_price(s).ok()?,
        _ => return None,
    };
    (price.is_finite() && price > 0.0).then_some(price)
}

fn product_name(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => items.iter().find_map(product_name),
        Value::Object(map) => {
            let is_product = map
                .get("@type")
                .and_then(Value::as_str)
                .map(|t| t.eq_ignore_ascii_case("product"))
                .unwrap_or(false);

            let own = if is_product {
                map.get("name")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            } else {
                None
            };

            own.or_else(|| map.get("@graph").and_then(product_name))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(json: &str) -> Html {
        Html::parse_document(&format!(
            r#"<html><head><script type="application/ld+json">{}</script></head><body></body></html>"#,
            json
        ))
    }

    #[test]
    fn test_direct_offers() {
        let document = doc(r#"{"@type":"Product","name":"Phone","offers":{"@type":"Offer","price":"12999","priceCurrency":"INR"}}"#);
        assert_eq!(json_ld_price(&document).unwrap(), Some(12999.0));
        assert_eq!(json_ld_name(&document).as_deref(), Some("Phone"));
    }

    #[test]
    fn test_graph_and_offer_array() {
        let document = doc(
            r#"{"@context":"https://schema.org","@graph":[
                {"@type":"BreadcrumbList"},
                {"@type":"Product","name":"Laptop","offers":[{"price":0},{"price":54990.5}]}
            ]}"#,
        );
        assert_eq!(json_ld_price(&document).unwrap(), Some(54990.5));
        assert_eq!(json_ld_name(&document).as_deref(), Some("Laptop"));
    }

    #[test]
    fn test_aggregate_offer_low_price() {
        let document = doc(r#"[{"@type":"Product","offers":{"@type":"AggregateOffer","lowPrice":"₹1,099"}}]"#);
        assert_eq!(json_ld_price(&document).unwrap(), Some(1099.0));
    }

    #[test]
    fn test_malformed_block_skipped() {
        let document = Html::parse_document(
            r#"<script type="application/ld+json">{ not json</script>
               <script type="application/ld+json">{"offers":{"price":499}}</script>"#,
        );
        assert_eq!(json_ld_price(&document).unwrap(), Some(499.0));
    }

    #[test]
    fn test_no_structured_data() {
        let document = Html::parse_document("<div class=\"price\">₹10</div>");
        assert_eq!(json_ld_price(&document).unwrap(), None);
        assert_eq!(json_ld_name(&document), None);
    }
}
