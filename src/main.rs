use anyhow::Result;
use clipcut_automation::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::load()?;

    // 初始化并运行应用
    let app = App::initialize(config).await?;
    let result = app.run().await;
    app.shutdown().await?;

    let report = result?;
    if let Some(reason) = &report.aborted {
        anyhow::bail!("运行提前中止: {}", reason);
    }

    Ok(())
}
