//! SenseBus 配置驱动的运行器
//!
//! 加载硬件与感知插件、接入消息总线，然后在当前线程上运行分发循环，
//! 直到通过 [`StopHandle`] 停止。

use crate::config::{ConfigManager, SenseConfig};
use crate::core::MessageBus;
use crate::plugins::{HardwarePlugin, ModuleLoader, PluginManager, SensePlugin};
use crate::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// 停止句柄，可跨线程克隆
#[derive(Clone)]
pub struct StopHandle {
    bus: Arc<MessageBus>,
}

impl StopHandle {
    /// 停止分发循环，之后总线不再恢复
    pub fn stop(&self) {
        info!("Received an interrupt signal, stopping message queue processing");
        self.bus.set_work(false);
    }

    pub fn is_stopped(&self) -> bool {
        !self.bus.is_running()
    }
}

/// 感知系统运行器
pub struct SenseRunner {
    config: SenseConfig,
    bus: Arc<MessageBus>,
    sense: PluginManager<dyn SensePlugin>,
    hardware: PluginManager<dyn HardwarePlugin>,
    shut_down: bool,
}

impl SenseRunner {
    /// 从配置创建运行器，使用原生动态库加载器
    pub fn from_config(config: SenseConfig) -> Result<Self> {
        let config = validated(config)?;
        let bus = Arc::new(MessageBus::new(config.bus.to_bus_config()));
        let sense = PluginManager::native(config.sense.clone(), bus.clone());
        let hardware = PluginManager::native(config.hardware.clone(), bus.clone());
        Self::build(config, bus, sense, hardware)
    }

    /// 从配置文件创建运行器
    pub async fn from_config_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_manager = ConfigManager::load_from_file(path).await?;
        Self::from_config(config_manager.get_config().clone())
    }

    /// 使用指定的模块加载器创建运行器
    pub fn with_loaders(
        config: SenseConfig,
        sense_loader: Box<dyn ModuleLoader<dyn SensePlugin>>,
        hardware_loader: Box<dyn ModuleLoader<dyn HardwarePlugin>>,
    ) -> Result<Self> {
        let config = validated(config)?;
        let bus = Arc::new(MessageBus::new(config.bus.to_bus_config()));
        let sense = PluginManager::new(config.sense.clone(), bus.clone(), sense_loader);
        let hardware = PluginManager::new(config.hardware.clone(), bus.clone(), hardware_loader);
        Self::build(config, bus, sense, hardware)
    }

    fn build(
        config: SenseConfig,
        bus: Arc<MessageBus>,
        sense: PluginManager<dyn SensePlugin>,
        hardware: PluginManager<dyn HardwarePlugin>,
    ) -> Result<Self> {
        let mut runner = Self {
            config,
            bus,
            sense,
            hardware,
            shut_down: false,
        };

        // 硬件插件先于感知插件加载
        runner.hardware.load_plugins()?;
        runner.hardware.configure_plugins(&runner.config.plugin_params)?;
        runner.sense.load_plugins()?;
        runner.sense.configure_plugins(&runner.config.plugin_params)?;

        info!(
            sense = runner.sense.plugin_names().len(),
            hardware = runner.hardware.plugin_names().len(),
            topics = runner.bus.topics().len(),
            "Sense runner ready"
        );
        Ok(runner)
    }

    /// 激活全部插件并运行分发循环，返回投递的消息数
    pub fn run(&mut self) -> Result<usize> {
        let sense = self.sense.activate_plugins()?;
        let hardware = self.hardware.activate_plugins()?;
        info!(sense, hardware, "Plugins activated, entering dispatch loop");

        let mut delivered = 0;
        while self.bus.wait_for_work() {
            delivered += self.bus.notify();
        }

        info!(delivered, "Dispatch loop stopped");
        Ok(delivered)
    }

    /// 停用并清理插件，清空总线后卸载全部模块
    pub fn shutdown(&mut self) -> Result<()> {
        if self.shut_down {
            return Ok(());
        }

        self.bus.set_work(false);
        self.sense.deactivate_plugins()?;
        self.hardware.deactivate_plugins()?;
        self.sense.cleanup_plugins()?;
        self.hardware.cleanup_plugins()?;

        // 订阅回调属于插件模块，必须在卸载前释放
        self.bus.clear();
        self.sense.unload_plugins()?;
        self.hardware.unload_plugins()?;

        self.shut_down = true;
        info!("Sense runner shut down");
        Ok(())
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            bus: self.bus.clone(),
        }
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn config(&self) -> &SenseConfig {
        &self.config
    }

    pub fn sense_manager(&self) -> &PluginManager<dyn SensePlugin> {
        &self.sense
    }

    pub fn hardware_manager(&self) -> &PluginManager<dyn HardwarePlugin> {
        &self.hardware
    }
}

fn validated(config: SenseConfig) -> Result<SenseConfig> {
    let config_manager = ConfigManager::from_config(config);
    config_manager.validate()?;
    Ok(config_manager.get_config().clone())
}

impl Drop for SenseRunner {
    fn drop(&mut self) {
        if !self.shut_down {
            if let Err(e) = self.shutdown() {
                warn!(error = %e, "Sense runner shutdown failed");
            }
        }
        self.bus.clear();
    }
}
