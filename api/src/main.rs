#[tokio::main]
async fn main() -> anyhow::Result<()> {
    lyricslib_api::run().await
}
