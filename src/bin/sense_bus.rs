//! SenseBus 主程序 - 配置驱动运行
//!
//! 通过YAML配置文件加载插件并运行消息分发循环，Ctrl-C 停止。

use anyhow::Context;
use sense_bus::{
    config::{generate_default_config_file, ConfigManager, LoggingConfig, SenseConfig},
    initialize,
    plugins::builtin,
    runner::SenseRunner,
};
use std::env;
use std::path::Path;

/// 程序入口点
#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(_) => {}
        Err(e) => {
            tracing::error!("❌ 程序运行失败: {:#}", e);
            eprintln!("sense_bus: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// 主要逻辑函数
async fn run_main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.len() {
        1 => run_with_default_config().await,
        2 => match args[1].as_str() {
            "init" => generate_config_file().await,
            "demo" => run_demo().await,
            "-h" | "--help" | "help" => {
                print_usage();
                Ok(())
            }
            path => run_with_config_file(path).await,
        },
        _ => {
            print_usage();
            Ok(())
        }
    }
}

/// 使用默认配置运行
async fn run_with_default_config() -> anyhow::Result<()> {
    let config_manager = ConfigManager::new_default();
    initialize(&config_manager.get_config().logging)?;
    tracing::info!("🚀 启动 SenseBus (默认配置)");

    config_manager.validate()?;
    let config = config_manager.get_config().clone();
    log_sections(&config);

    let runner = SenseRunner::from_config(config).context("failed to load plugins")?;
    run_until_interrupted(runner).await
}

/// 使用配置文件运行
async fn run_with_config_file(config_path: &str) -> anyhow::Result<()> {
    if !Path::new(config_path).exists() {
        initialize(&LoggingConfig::default())?;
        tracing::error!("❌ 配置文件不存在: {}", config_path);
        tracing::info!("💡 使用 'sense_bus init' 生成默认配置文件");
        return Ok(());
    }

    let config_manager = ConfigManager::load_from_file(config_path).await?;
    initialize(&config_manager.get_config().logging)?;
    tracing::info!("🚀 启动 SenseBus");
    tracing::info!("📄 配置文件: {}", config_path);

    config_manager.validate()?;
    let config = config_manager.get_config().clone();
    tracing::info!("🏗️  框架: {} v{}", config.framework.name, config.framework.version);
    log_sections(&config);

    let runner = SenseRunner::from_config(config).context("failed to load plugins")?;
    run_until_interrupted(runner).await
}

/// 使用内置演示插件运行
async fn run_demo() -> anyhow::Result<()> {
    let config = SenseConfig::default();
    initialize(&config.logging)?;
    tracing::info!("🚀 启动 SenseBus (内置演示插件)");

    let sense_loader = builtin::sense_loader(&config.sense.plugin_dir, &config.sense.category);
    let hardware_loader =
        builtin::hardware_loader(&config.hardware.plugin_dir, &config.hardware.category);
    let runner = SenseRunner::with_loaders(config, Box::new(sense_loader), Box::new(hardware_loader))?;
    run_until_interrupted(runner).await
}

/// 在阻塞线程上运行分发循环，收到 Ctrl-C 后停止并清理
async fn run_until_interrupted(runner: SenseRunner) -> anyhow::Result<()> {
    let stop = runner.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.stop();
        }
    });

    tracing::info!("⚡ 消息分发循环已启动，按 Ctrl-C 停止");
    let delivered = tokio::task::spawn_blocking(move || -> sense_bus::Result<usize> {
        let mut runner = runner;
        let delivered = runner.run()?;
        runner.shutdown()?;
        Ok(delivered)
    })
    .await
    .context("dispatch loop panicked")??;

    tracing::info!("📨 投递消息: {}", delivered);
    tracing::info!("🎉 运行结束");
    Ok(())
}

fn log_sections(config: &SenseConfig) {
    tracing::info!(
        "🔌 感知插件: {} ({}){}",
        config.sense.plugin_dir.display(),
        config.sense.category,
        if config.sense.enabled { "" } else { " [disabled]" }
    );
    tracing::info!(
        "📷 硬件插件: {} ({}){}",
        config.hardware.plugin_dir.display(),
        config.hardware.category,
        if config.hardware.enabled { "" } else { " [disabled]" }
    );
}

/// 生成默认配置文件
async fn generate_config_file() -> anyhow::Result<()> {
    initialize(&LoggingConfig::default())?;
    let config_path = "sense_bus_config.yaml";

    tracing::info!("📝 生成默认配置文件: {}", config_path);
    generate_default_config_file(config_path).await?;

    tracing::info!("✅ 配置文件生成完成");
    tracing::info!("🔧 请编辑配置文件后运行: sense_bus {}", config_path);
    Ok(())
}

/// 打印使用说明
fn print_usage() {
    println!("SenseBus 感知消息总线");
    println!();
    println!("用法:");
    println!("  sense_bus                    # 使用默认配置运行");
    println!("  sense_bus init               # 生成默认配置文件");
    println!("  sense_bus demo               # 使用内置演示插件运行");
    println!("  sense_bus <config_file>      # 使用指定配置文件运行");
    println!();
    println!("示例:");
    println!("  sense_bus init");
    println!("  sense_bus sense_bus_config.yaml");
    println!();
    println!("配置文件格式: YAML");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generate_config_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let test_config_path = temp_dir.path().join("sense_bus_config.yaml");

        generate_default_config_file(&test_config_path).await.unwrap();
        assert!(test_config_path.exists());

        let config_manager = ConfigManager::load_from_file(&test_config_path).await.unwrap();
        assert!(config_manager.validate().is_ok());
    }
}
