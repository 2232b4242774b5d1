//! 插件管理器
//!
//! 负责一个插件分区的加载、配置、消息接线和生命周期调度。
//! 状态转换由这里保证：只对处于合适状态的插件调用生命周期方法。

use super::core::{ErrorCallback, ManagedPlugin, PluginError, PluginState};
use super::loader::ModuleLoader;
use super::registry::PluginRegistry;
use crate::config::PluginSection;
use crate::core::MessageBus;
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 插件管理器
pub struct PluginManager<P: ?Sized + ManagedPlugin + 'static> {
    registry: PluginRegistry<P>,
    section: PluginSection,
    bus: Arc<MessageBus>,
}

impl<P: ?Sized + ManagedPlugin + 'static> PluginManager<P> {
    /// 使用指定的模块加载器创建管理器
    pub fn new(section: PluginSection, bus: Arc<MessageBus>, loader: Box<dyn ModuleLoader<P>>) -> Self {
        Self {
            registry: PluginRegistry::new(loader),
            section,
            bus,
        }
    }

    /// 使用原生动态库加载器创建管理器
    pub fn native(section: PluginSection, bus: Arc<MessageBus>) -> Self {
        Self {
            registry: PluginRegistry::native(),
            section,
            bus,
        }
    }

    /// 加载分区目录中的全部插件
    pub fn load_plugins(&mut self) -> Result<usize> {
        self.section.validate("plugin section")?;

        if !self.section.enabled {
            info!(category = %self.section.category, "Plugin section disabled, skipping");
            return Ok(0);
        }

        let loaded = self
            .registry
            .load_all(&self.section.plugin_dir, &self.section.category)?;
        info!(
            category = %self.section.category,
            dir = %self.section.plugin_dir.display(),
            loaded,
            "Plugins loaded"
        );
        Ok(loaded)
    }

    /// 配置未配置的插件，并把档案中的发布者和订阅者接入总线
    ///
    /// 配置失败的插件不会接入总线。返回成功配置的数量。
    pub fn configure_plugins(&mut self, params: &HashMap<String, HashMap<String, String>>) -> Result<usize> {
        let mut configured = 0;

        for name in self.plugin_names() {
            let plugin = self.registry.get_plugin_mut(&name)?;
            if plugin.state() != PluginState::Unconfigured {
                debug!(plugin = %name, state = ?plugin.state(), "Plugin already configured");
                continue;
            }

            let plugin_params = params.get(&name).cloned().unwrap_or_default();
            if !plugin.configure(&plugin_params) {
                error!(plugin = %name, "Plugin configuration failed");
                continue;
            }

            setup_messaging(&self.bus, &name, plugin);
            configured += 1;
        }

        Ok(configured)
    }

    /// 激活所有已配置的插件
    pub fn activate_plugins(&mut self) -> Result<usize> {
        self.transition(PluginState::Inactive, "activate", |plugin| plugin.activate())
    }

    /// 停用所有运行中的插件
    pub fn deactivate_plugins(&mut self) -> Result<usize> {
        self.transition(PluginState::Active, "deactivate", |plugin| plugin.deactivate())
    }

    /// 清理所有未运行的插件
    pub fn cleanup_plugins(&mut self) -> Result<usize> {
        let mut cleaned = 0;
        for name in self.plugin_names() {
            let plugin = self.registry.get_plugin_mut(&name)?;
            match plugin.state() {
                PluginState::Shutdown => continue,
                PluginState::Active => {
                    warn!(plugin = %name, "Cannot clean up an active plugin");
                    continue;
                }
                _ => {}
            }

            if plugin.cleanup() {
                cleaned += 1;
            } else {
                error!(plugin = %name, "Plugin cleanup failed");
            }
        }
        Ok(cleaned)
    }

    /// 卸载全部插件
    pub fn unload_plugins(&mut self) -> Result<()> {
        self.registry.unload_all()
    }

    /// 已加载插件名，按名称排序
    pub fn plugin_names(&self) -> Vec<String> {
        let mut names = self.registry.list_loaded_plugins();
        names.sort();
        names
    }

    /// 插件状态
    pub fn plugin_state(&self, name: &str) -> Result<PluginState> {
        Ok(self.registry.get_plugin(name)?.state())
    }

    pub fn section(&self) -> &PluginSection {
        &self.section
    }

    pub fn registry(&self) -> &PluginRegistry<P> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut PluginRegistry<P> {
        &mut self.registry
    }

    fn transition<F>(&mut self, from: PluginState, action: &str, mut step: F) -> Result<usize>
    where
        F: FnMut(&mut P) -> bool,
    {
        let mut changed = 0;
        for name in self.plugin_names() {
            let plugin = self.registry.get_plugin_mut(&name)?;
            if plugin.state() != from {
                debug!(plugin = %name, state = ?plugin.state(), action, "Skipping plugin");
                continue;
            }

            if step(plugin) {
                info!(plugin = %name, action, "Plugin lifecycle step completed");
                changed += 1;
            } else {
                error!(plugin = %name, action, "Plugin lifecycle step failed");
            }
        }
        Ok(changed)
    }
}

/// 注册订阅者和发布者，并下发发送函数与错误回调
fn setup_messaging<P: ?Sized + ManagedPlugin>(bus: &Arc<MessageBus>, name: &str, plugin: &mut P) {
    let profile = plugin.profile();

    for subscriber in profile.subscribers() {
        bus.subscribe(&subscriber.topic, &subscriber.name, subscriber.callback.clone());
    }

    for publisher in profile.publishers() {
        bus.publish(&publisher.topic, publisher.clone());
    }

    plugin.set_message_sender(bus.sender());

    let error_callback: ErrorCallback = Arc::new(|e: PluginError| {
        error!(plugin = %e.plugin, "{}", e.message);
    });
    plugin.set_error_callback(error_callback);

    debug!(plugin = name, "Messaging configured");
}
