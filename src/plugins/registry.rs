//! 插件注册表
//!
//! 按 `类别,库名` 管理已加载的插件实例及其模块句柄。
//! 插件实例总是先于其模块释放。

use super::core::Plugin;
use super::loader::{factory_symbol, module_path, ModuleLoader, NativeModuleLoader, PluginModule};
use crate::{Result, SenseBusError};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// 加载回调：`(模块路径, 类别, 工厂符号)`
pub type LoadObserver = Box<dyn Fn(&Path, &str, &str) + Send + Sync>;

/// 卸载回调：插件名
pub type UnloadObserver = Box<dyn Fn(&str) + Send + Sync>;

/// 单次加载的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// 成功加载
    Loaded,
    /// 同名插件已加载，跳过
    AlreadyLoaded,
    /// 模块中没有该类别的工厂函数
    NoFactory,
}

/// 插件名：`类别,库名`
pub fn plugin_name(category: &str, library_name: &str) -> String {
    format!("{},{}", category, library_name)
}

/// 插件注册表
pub struct PluginRegistry<P: ?Sized + Plugin + 'static> {
    /// 插件实例，声明在模块之前以保证先释放
    plugins: HashMap<String, Box<P>>,
    /// 模块句柄
    modules: HashMap<String, Box<dyn PluginModule<P>>>,
    loader: Box<dyn ModuleLoader<P>>,
    on_load: Option<LoadObserver>,
    on_unload: Option<UnloadObserver>,
}

impl<P: ?Sized + Plugin + 'static> PluginRegistry<P> {
    /// 使用指定的模块加载器创建注册表
    pub fn new(loader: Box<dyn ModuleLoader<P>>) -> Self {
        Self {
            plugins: HashMap::new(),
            modules: HashMap::new(),
            loader,
            on_load: None,
            on_unload: None,
        }
    }

    /// 使用原生动态库加载器创建注册表
    pub fn native() -> Self {
        Self::new(Box::new(NativeModuleLoader))
    }

    /// 设置加载回调，在模块打开前调用
    pub fn set_load_observer<F>(&mut self, observer: F)
    where
        F: Fn(&Path, &str, &str) + Send + Sync + 'static,
    {
        self.on_load = Some(Box::new(observer));
    }

    /// 设置卸载回调，在查找插件之前调用
    pub fn set_unload_observer<F>(&mut self, observer: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_unload = Some(Box::new(observer));
    }

    /// 从 `dir` 加载名为 `library_name` 的模块，并用 `category` 的工厂函数创建插件
    pub fn load(&mut self, dir: &Path, library_name: &str, category: &str) -> Result<LoadOutcome> {
        if library_name.is_empty() || category.is_empty() {
            return Err(SenseBusError::plugin_load(
                "library name and category must not be empty",
            ));
        }

        let name = plugin_name(category, library_name);
        if self.plugins.contains_key(&name) {
            warn!(plugin = %name, "Plugin is already loaded, skipping");
            return Ok(LoadOutcome::AlreadyLoaded);
        }

        let path = module_path(dir, library_name);
        let symbol = factory_symbol(category);
        if !self.loader.exports_symbol(&path, &symbol)? {
            warn!(
                path = %path.display(),
                symbol = %symbol,
                "Module has no factory for this category, skipping"
            );
            return Ok(LoadOutcome::NoFactory);
        }

        if let Some(observer) = &self.on_load {
            observer(path.as_path(), category, symbol.as_str());
        }

        let module = self.loader.open(&path)?;
        let factory = module.factory(&symbol).ok_or_else(|| {
            SenseBusError::plugin_load(&format!(
                "{}: symbol {} is exported but could not be resolved",
                path.display(),
                symbol
            ))
        })?;

        let plugin = factory();
        info!(plugin = %name, path = %path.display(), "Loaded plugin");

        self.modules.insert(name.clone(), module);
        self.plugins.insert(name, plugin);
        Ok(LoadOutcome::Loaded)
    }

    /// 加载目录中的全部模块，遇到第一个错误即停止
    pub fn load_all(&mut self, dir: &Path, category: &str) -> Result<usize> {
        let library_names = self.loader.discover(dir)?;
        debug!(dir = %dir.display(), count = library_names.len(), "Discovered modules");

        let mut loaded = 0;
        for library_name in library_names {
            if self.load(dir, &library_name, category)? == LoadOutcome::Loaded {
                loaded += 1;
            }
        }

        info!(dir = %dir.display(), category, loaded, "Finished loading plugins");
        Ok(loaded)
    }

    /// 卸载插件：先释放实例，再关闭模块
    pub fn unload(&mut self, name: &str) -> Result<()> {
        if let Some(observer) = &self.on_unload {
            observer(name);
        }

        let plugin = self
            .plugins
            .remove(name)
            .ok_or_else(|| SenseBusError::plugin_not_found(name))?;
        drop(plugin);
        drop(self.modules.remove(name));

        info!(plugin = name, "Unloaded plugin");
        Ok(())
    }

    /// 卸载全部插件，遇到第一个错误即停止
    pub fn unload_all(&mut self) -> Result<()> {
        for name in self.list_loaded_plugins() {
            self.unload(&name)?;
        }
        Ok(())
    }

    /// 获取插件
    pub fn get_plugin(&self, name: &str) -> Result<&P> {
        self.plugins
            .get(name)
            .map(|plugin| &**plugin)
            .ok_or_else(|| SenseBusError::plugin_not_found(name))
    }

    /// 获取可变插件
    pub fn get_plugin_mut(&mut self, name: &str) -> Result<&mut P> {
        self.plugins
            .get_mut(name)
            .map(|plugin| &mut **plugin)
            .ok_or_else(|| SenseBusError::plugin_not_found(name))
    }

    /// 已加载插件名，顺序不定
    pub fn list_loaded_plugins(&self) -> Vec<String> {
        self.plugins.keys().cloned().collect()
    }

    /// 是否已加载
    pub fn is_loaded(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl<P: ?Sized + Plugin + 'static> Drop for PluginRegistry<P> {
    fn drop(&mut self) {
        if let Err(e) = self.unload_all() {
            warn!(error = %e, "Failed to unload plugins during teardown");
        }
        // 兜底：保证剩余实例先于模块释放
        self.plugins.clear();
        self.modules.clear();
    }
}
