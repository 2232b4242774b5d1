//! 插件模块加载器
//!
//! 注册表先通过 [`ModuleLoader::exports_symbol`] 检查模块是否导出工厂函数（不打开模块），
//! 再通过 [`ModuleLoader`] 打开模块、通过 [`PluginModule`] 查找工厂函数。
//! 动态库的 `unsafe` 操作只出现在 [`NativeModuleLoader`] 中。

use crate::{Result, SenseBusError};
use libloading::Library;
use object::Object;
use std::collections::HashMap;
use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// 插件工厂函数
pub type PluginFactory<P> = fn() -> Box<P>;

/// 已打开的插件模块
///
/// 模块被释放时对应的库句柄随之关闭，因此必须晚于它创建的所有插件实例释放。
pub trait PluginModule<P: ?Sized>: Send {
    /// 按符号名查找工厂函数
    fn factory(&self, symbol: &str) -> Option<PluginFactory<P>>;
}

/// 模块加载器
pub trait ModuleLoader<P: ?Sized>: Send + Sync {
    /// 检查模块是否导出 `symbol`，不打开模块、不执行其初始化代码
    fn exports_symbol(&self, path: &Path, symbol: &str) -> Result<bool>;

    /// 打开指定路径的模块
    fn open(&self, path: &Path) -> Result<Box<dyn PluginModule<P>>>;

    /// 列出目录中可加载的库名
    fn discover(&self, dir: &Path) -> Result<Vec<String>> {
        scan_module_dir(dir)
    }
}

/// 工厂函数的符号名：`<类别>_create`
pub fn factory_symbol(category: &str) -> String {
    format!("{}_create", category)
}

/// 平台相关的模块路径：`dir/<前缀>库名<后缀>`
pub fn module_path(dir: &Path, library_name: &str) -> PathBuf {
    dir.join(format!("{}{}{}", DLL_PREFIX, library_name, DLL_SUFFIX))
}

/// 从模块文件名中取出库名
pub fn library_name_of(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    let name = file_name.strip_prefix(DLL_PREFIX)?.strip_suffix(DLL_SUFFIX)?;
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// 扫描目录中的动态库文件，返回排序后的库名
pub fn scan_module_dir(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        match library_name_of(&path) {
            Some(name) => names.push(name),
            None => debug!(path = %path.display(), "Skipping non-module file"),
        }
    }
    names.sort();
    Ok(names)
}

/// 基于 `libloading` 的原生动态库加载器
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeModuleLoader;

struct NativeModule {
    library: Library,
}

impl<P: ?Sized + 'static> PluginModule<P> for NativeModule {
    fn factory(&self, symbol: &str) -> Option<PluginFactory<P>> {
        // SAFETY: 符号由 declare_plugin! 生成，签名固定为 fn() -> Box<P>
        let factory = unsafe { self.library.get::<PluginFactory<P>>(symbol.as_bytes()) };
        match factory {
            Ok(factory) => Some(*factory),
            Err(e) => {
                debug!(symbol, error = %e, "Factory symbol lookup failed");
                None
            }
        }
    }
}

fn module_not_found(path: &Path) -> SenseBusError {
    SenseBusError::Io(io::Error::new(
        io::ErrorKind::NotFound,
        format!("module not found: {}", path.display()),
    ))
}

/// 导出名是否与符号匹配，Mach-O 的导出名带有前导下划线
fn export_matches(export: &[u8], symbol: &str) -> bool {
    let symbol = symbol.as_bytes();
    export == symbol || export.strip_prefix(b"_") == Some(symbol)
}

impl<P: ?Sized + 'static> ModuleLoader<P> for NativeModuleLoader {
    fn exports_symbol(&self, path: &Path, symbol: &str) -> Result<bool> {
        if !path.exists() {
            return Err(module_not_found(path));
        }
        let data = fs::read(path)?;
        let file = object::File::parse(&*data)?;
        let found = file
            .exports()?
            .iter()
            .any(|export| export_matches(export.name(), symbol));
        debug!(path = %path.display(), symbol, found, "Checked module exports");
        Ok(found)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn PluginModule<P>>> {
        if !path.exists() {
            return Err(module_not_found(path));
        }
        // SAFETY: 加载库会执行其初始化代码，插件目录由配置指定并视为可信
        let library = unsafe { Library::new(path)? };
        Ok(Box::new(NativeModule { library }))
    }
}

/// 静态链接的插件模块加载器
///
/// 将编译进程序的工厂函数挂在虚拟路径下，供内置插件和测试使用。
pub struct StaticModuleLoader<P: ?Sized> {
    modules: HashMap<PathBuf, HashMap<String, PluginFactory<P>>>,
}

impl<P: ?Sized> StaticModuleLoader<P> {
    pub fn new() -> Self {
        Self {
            modules: HashMap::new(),
        }
    }

    /// 在 `dir` 下注册名为 `library_name` 的模块及其工厂函数
    pub fn register(
        &mut self,
        dir: &Path,
        library_name: &str,
        symbol: &str,
        factory: PluginFactory<P>,
    ) -> &mut Self {
        self.modules
            .entry(module_path(dir, library_name))
            .or_default()
            .insert(symbol.to_string(), factory);
        self
    }

    /// 注册一个没有任何工厂函数的模块
    pub fn register_empty(&mut self, dir: &Path, library_name: &str) -> &mut Self {
        self.modules.entry(module_path(dir, library_name)).or_default();
        self
    }
}

impl<P: ?Sized> Default for StaticModuleLoader<P> {
    fn default() -> Self {
        Self::new()
    }
}

struct StaticModule<P: ?Sized> {
    factories: HashMap<String, PluginFactory<P>>,
}

impl<P: ?Sized + 'static> PluginModule<P> for StaticModule<P> {
    fn factory(&self, symbol: &str) -> Option<PluginFactory<P>> {
        self.factories.get(symbol).copied()
    }
}

impl<P: ?Sized + 'static> ModuleLoader<P> for StaticModuleLoader<P> {
    fn exports_symbol(&self, path: &Path, symbol: &str) -> Result<bool> {
        let factories = self.modules.get(path).ok_or_else(|| module_not_found(path))?;
        Ok(factories.contains_key(symbol))
    }

    fn open(&self, path: &Path) -> Result<Box<dyn PluginModule<P>>> {
        let factories = self.modules.get(path).ok_or_else(|| module_not_found(path))?;
        Ok(Box::new(StaticModule {
            factories: factories.clone(),
        }))
    }

    fn discover(&self, dir: &Path) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .modules
            .keys()
            .filter(|path| path.parent() == Some(dir))
            .filter_map(|path| library_name_of(path))
            .collect();
        names.sort();
        Ok(names)
    }
}

/// 导出插件工厂函数
///
/// ```ignore
/// declare_plugin!(Sense_create: dyn SensePlugin = FaceDetector::create);
/// ```
#[macro_export]
macro_rules! declare_plugin {
    ($symbol:ident : $plugin:ty = $ctor:path) => {
        #[no_mangle]
        #[allow(non_snake_case)]
        pub fn $symbol() -> Box<$plugin> {
            $ctor()
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    trait Named: Send {
        fn label(&self) -> &'static str;
    }

    struct Alpha;

    impl Named for Alpha {
        fn label(&self) -> &'static str {
            "alpha"
        }
    }

    fn make_alpha() -> Box<dyn Named> {
        Box::new(Alpha)
    }

    #[test]
    fn test_factory_symbol() {
        assert_eq!(factory_symbol("Sense"), "Sense_create");
        assert_eq!(factory_symbol("SenseHw"), "SenseHw_create");
    }

    #[test]
    fn test_module_path_roundtrip() {
        let path = module_path(Path::new("sense/plugins"), "face_detector");
        assert!(path.starts_with("sense/plugins"));
        assert_eq!(library_name_of(&path).as_deref(), Some("face_detector"));

        assert!(library_name_of(Path::new("sense/plugins/README.md")).is_none());
    }

    #[test]
    fn test_scan_module_dir() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["b_plugin", "a_plugin"] {
            fs::write(module_path(temp_dir.path(), name), b"").unwrap();
        }
        fs::write(temp_dir.path().join("notes.txt"), b"").unwrap();
        fs::create_dir(module_path(temp_dir.path(), "not_a_file")).unwrap();

        let names = scan_module_dir(temp_dir.path()).unwrap();
        assert_eq!(names, vec!["a_plugin", "b_plugin"]);
    }

    #[test]
    fn test_scan_missing_dir_fails() {
        let result = scan_module_dir(Path::new("/nonexistent/sense/plugins"));
        assert!(matches!(result, Err(SenseBusError::Io(_))));
    }

    #[test]
    fn test_static_loader() {
        let dir = Path::new("builtin");
        let mut loader = StaticModuleLoader::<dyn Named>::new();
        loader
            .register(dir, "alpha", "Test_create", make_alpha)
            .register_empty(dir, "empty");

        assert!(loader.exports_symbol(&module_path(dir, "alpha"), "Test_create").unwrap());
        assert!(!loader.exports_symbol(&module_path(dir, "empty"), "Test_create").unwrap());
        assert!(loader.exports_symbol(&module_path(dir, "missing"), "Test_create").is_err());

        let module = loader.open(&module_path(dir, "alpha")).unwrap();
        let factory = module.factory("Test_create").unwrap();
        assert_eq!(factory().label(), "alpha");
        assert!(module.factory("Other_create").is_none());

        assert!(loader.open(&module_path(dir, "missing")).is_err());
        assert_eq!(loader.discover(dir).unwrap(), vec!["alpha", "empty"]);
        assert!(loader.discover(Path::new("elsewhere")).unwrap().is_empty());
    }

    #[test]
    fn test_native_loader_missing_module() {
        let temp_dir = TempDir::new().unwrap();
        let loader = NativeModuleLoader;
        let result = ModuleLoader::<dyn Named>::open(&loader, &module_path(temp_dir.path(), "ghost"));
        assert!(matches!(result, Err(SenseBusError::Io(_))));

        let result =
            ModuleLoader::<dyn Named>::exports_symbol(&loader, &module_path(temp_dir.path(), "ghost"), "cos");
        assert!(matches!(result, Err(SenseBusError::Io(_))));
    }

    #[test]
    fn test_native_export_check_rejects_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let path = module_path(temp_dir.path(), "garbage");
        fs::write(&path, b"not a library").unwrap();

        let result = ModuleLoader::<dyn Named>::exports_symbol(&NativeModuleLoader, &path, "Test_create");
        assert!(matches!(result, Err(SenseBusError::ModuleFormat(_))));
    }

    #[test]
    fn test_export_matches() {
        assert!(export_matches(b"Sense_create", "Sense_create"));
        assert!(export_matches(b"_Sense_create", "Sense_create"));
        assert!(!export_matches(b"SenseHw_create", "Sense_create"));
        assert!(!export_matches(b"__Sense_create", "Sense_create"));
    }

    /// 系统 libm 的路径，找不到时返回 `None`
    #[cfg(target_os = "linux")]
    fn system_libm() -> Option<PathBuf> {
        [
            "/lib/x86_64-linux-gnu/libm.so.6",
            "/usr/lib/x86_64-linux-gnu/libm.so.6",
            "/lib/aarch64-linux-gnu/libm.so.6",
            "/usr/lib/aarch64-linux-gnu/libm.so.6",
            "/lib64/libm.so.6",
            "/usr/lib64/libm.so.6",
            "/usr/lib/libm.so.6",
            "/lib/libm.so.6",
        ]
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_native_loader_real_library() {
        let Some(libm) = system_libm() else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();
        let path = module_path(temp_dir.path(), "math");
        std::os::unix::fs::symlink(&libm, &path).unwrap();

        let loader = NativeModuleLoader;
        assert!(ModuleLoader::<dyn Named>::exports_symbol(&loader, &path, "cos").unwrap());
        assert!(!ModuleLoader::<dyn Named>::exports_symbol(&loader, &path, "Test_create").unwrap());

        let module = ModuleLoader::<dyn Named>::open(&loader, &path).unwrap();
        assert!(module.factory("Test_create").is_none());
        // 只查找符号，不调用
        assert!(module.factory("cos").is_some());
    }
}
