mod app;
mod backend;
mod cli;
mod config;
mod sync;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // --debug 只改变默认级别，RUST_LOG 仍然优先
    let default_level = if cli.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    // 加载配置，命令行参数覆盖后端程序
    let mut config = config::Config::load_or_default()?;
    if let Some(program) = cli.backend {
        config.backend.program = program;
    }

    if !cli::run(cli.command, config, cli.verbose).await? {
        std::process::exit(1);
    }

    Ok(())
}
