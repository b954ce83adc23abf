#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = codequest_grader::run().await {
        eprintln!("codequest-grader fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
