// Price Tracker - Flipkart price watch service

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    price_tracker_lib::run().await
}
