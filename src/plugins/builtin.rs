//! 内置演示插件
//!
//! 一个相机硬件插件和一个转发感知插件：相机在激活时发布一帧，
//! 感知插件订阅相机话题并把收到的每一帧转发到自己的输出话题。
//! 启用 `demo-plugins` 特性时两者的工厂函数会从动态库中导出。

use super::core::{
    DeviceInfo, DeviceType, ErrorCallback, HardwarePlugin, HardwareProfile, ManagedPlugin, Plugin,
    PluginError, PluginProfile, PluginState, SensePlugin, SenseProfile, HARDWARE_CATEGORY,
    SENSE_CATEGORY,
};
use super::loader::{factory_symbol, StaticModuleLoader};
use super::registry::plugin_name;
use crate::types::{
    Header, Message, MessageHandle, MessageSender, MessageType, Publisher, Subscriber, TimestampNs,
};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

pub const DEMO_SENSE_LIBRARY: &str = "demo_sense_plugin";
pub const DEMO_CAMERA_LIBRARY: &str = "demo_camera_plugin";

/// 感知插件的发布者名
pub const DEMO_SENSE_PUBLISHER: &str = DEMO_SENSE_LIBRARY;
/// 相机插件的发布者名
pub const DEMO_CAMERA_PUBLISHER: &str = DEMO_CAMERA_LIBRARY;

/// 相机帧话题
pub const CAMERA_TOPIC: &str = "test3";
/// 感知插件激活时发送的话题
pub const STARTUP_TOPIC: &str = "test1";
/// 感知插件转发话题
pub const RELAY_TOPIC: &str = "test2";

/// 设为 `true` 时感知插件的 `configure` 返回失败
pub const FAIL_CONFIGURE_PARAM: &str = "fail_configure";

/// 演示用图像帧
#[derive(Debug, Clone)]
pub struct DemoFrame {
    pub header: Header,
    pub sequence: u64,
}

impl Message for DemoFrame {
    fn timestamp(&self) -> TimestampNs {
        self.header.timestamp
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// 转发感知插件
pub struct DemoSensePlugin {
    profile: PluginProfile,
    state: PluginState,
    params: HashMap<String, String>,
    sender: Arc<RwLock<Option<MessageSender>>>,
    error_callback: Option<ErrorCallback>,
    relayed: Arc<AtomicUsize>,
}

impl DemoSensePlugin {
    pub fn new() -> Self {
        let sender: Arc<RwLock<Option<MessageSender>>> = Arc::new(RwLock::new(None));
        let relayed = Arc::new(AtomicUsize::new(0));

        let relay_sender = sender.clone();
        let relay_count = relayed.clone();
        let relay = Subscriber::new(
            CAMERA_TOPIC,
            &plugin_name(SENSE_CATEGORY, DEMO_SENSE_LIBRARY),
            move |msg: MessageHandle| {
                let sender = relay_sender.read().clone();
                if let Some(send) = sender {
                    if send(RELAY_TOPIC, DEMO_SENSE_PUBLISHER, msg).is_ok() {
                        relay_count.fetch_add(1, Ordering::SeqCst);
                    }
                }
            },
        );

        let profile = PluginProfile::Sensing(SenseProfile {
            threaded: false,
            publishers: vec![
                Publisher::new(STARTUP_TOPIC, DEMO_SENSE_PUBLISHER, MessageType::Image),
                Publisher::new(RELAY_TOPIC, DEMO_SENSE_PUBLISHER, MessageType::Image),
            ],
            subscribers: vec![relay],
        });

        Self {
            profile,
            state: PluginState::Unconfigured,
            params: HashMap::new(),
            sender,
            error_callback: None,
            relayed,
        }
    }

    /// 工厂函数
    pub fn create() -> Box<dyn SensePlugin> {
        Box::new(Self::new())
    }

    /// 已转发的帧数
    pub fn relayed(&self) -> usize {
        self.relayed.load(Ordering::SeqCst)
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }
}

impl Default for DemoSensePlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for DemoSensePlugin {
    fn name(&self) -> String {
        plugin_name(SENSE_CATEGORY, DEMO_SENSE_LIBRARY)
    }

    fn profile(&self) -> &PluginProfile {
        &self.profile
    }
}

impl ManagedPlugin for DemoSensePlugin {
    fn configure(&mut self, params: &HashMap<String, String>) -> bool {
        if params.get(FAIL_CONFIGURE_PARAM).map(String::as_str) == Some("true") {
            return false;
        }
        self.params = params.clone();
        self.state = PluginState::Inactive;
        true
    }

    fn activate(&mut self) -> bool {
        self.state = PluginState::Active;

        let sender = self.sender.read().clone();
        if let Some(send) = sender {
            let frame: MessageHandle = Arc::new(DemoFrame {
                header: Header::new("demo"),
                sequence: 0,
            });
            if let Err(e) = send(STARTUP_TOPIC, DEMO_SENSE_PUBLISHER, frame) {
                if let Some(callback) = &self.error_callback {
                    callback(PluginError::new(&self.name(), &e.to_string()));
                }
            }
        }
        true
    }

    fn deactivate(&mut self) -> bool {
        self.state = PluginState::Inactive;
        true
    }

    fn cleanup(&mut self) -> bool {
        self.state = PluginState::Shutdown;
        true
    }

    fn state(&self) -> PluginState {
        self.state
    }

    fn set_message_sender(&mut self, sender: MessageSender) {
        *self.sender.write() = Some(sender);
    }

    fn set_error_callback(&mut self, callback: ErrorCallback) {
        self.error_callback = Some(callback);
    }
}

impl SensePlugin for DemoSensePlugin {}

/// 演示相机插件
pub struct DemoCameraPlugin {
    profile: PluginProfile,
    state: PluginState,
    sender: Option<MessageSender>,
    error_callback: Option<ErrorCallback>,
    sequence: AtomicU64,
}

impl DemoCameraPlugin {
    pub fn new() -> Self {
        let profile = PluginProfile::Hardware(HardwareProfile {
            device: DeviceInfo {
                device_type: DeviceType::Camera,
                id: "2".to_string(),
                name: "dummydevice".to_string(),
                attributes: vec!["RGBD".to_string()],
            },
            publishers: vec![Publisher::new(
                CAMERA_TOPIC,
                DEMO_CAMERA_PUBLISHER,
                MessageType::Image,
            )],
        });

        Self {
            profile,
            state: PluginState::Unconfigured,
            sender: None,
            error_callback: None,
            sequence: AtomicU64::new(0),
        }
    }

    /// 工厂函数
    pub fn create() -> Box<dyn HardwarePlugin> {
        Box::new(Self::new())
    }

    /// 采集并发布一帧，未激活时不发送
    pub fn capture(&self) -> bool {
        if self.state != PluginState::Active {
            debug!("Camera is not active, dropping capture");
            return false;
        }
        let Some(send) = &self.sender else {
            return false;
        };

        let frame: MessageHandle = Arc::new(DemoFrame {
            header: Header::new("camera"),
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
        });
        match send(CAMERA_TOPIC, DEMO_CAMERA_PUBLISHER, frame) {
            Ok(()) => true,
            Err(e) => {
                if let Some(callback) = &self.error_callback {
                    callback(PluginError::new(&self.name(), &e.to_string()));
                }
                false
            }
        }
    }
}

impl Default for DemoCameraPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for DemoCameraPlugin {
    fn name(&self) -> String {
        plugin_name(HARDWARE_CATEGORY, DEMO_CAMERA_LIBRARY)
    }

    fn profile(&self) -> &PluginProfile {
        &self.profile
    }
}

impl ManagedPlugin for DemoCameraPlugin {
    fn configure(&mut self, _params: &HashMap<String, String>) -> bool {
        self.state = PluginState::Inactive;
        true
    }

    fn activate(&mut self) -> bool {
        self.state = PluginState::Active;
        info!(device = "dummydevice", "Camera activated");
        self.capture();
        true
    }

    fn deactivate(&mut self) -> bool {
        self.state = PluginState::Inactive;
        true
    }

    fn cleanup(&mut self) -> bool {
        self.state = PluginState::Shutdown;
        true
    }

    fn state(&self) -> PluginState {
        self.state
    }

    fn set_message_sender(&mut self, sender: MessageSender) {
        self.sender = Some(sender);
    }

    fn set_error_callback(&mut self, callback: ErrorCallback) {
        self.error_callback = Some(callback);
    }
}

impl HardwarePlugin for DemoCameraPlugin {}

/// 把演示感知插件挂到 `dir` 下的静态加载器
pub fn sense_loader(dir: &Path, category: &str) -> StaticModuleLoader<dyn SensePlugin> {
    let mut loader = StaticModuleLoader::new();
    loader.register(dir, DEMO_SENSE_LIBRARY, &factory_symbol(category), DemoSensePlugin::create);
    loader
}

/// 把演示相机插件挂到 `dir` 下的静态加载器
pub fn hardware_loader(dir: &Path, category: &str) -> StaticModuleLoader<dyn HardwarePlugin> {
    let mut loader = StaticModuleLoader::new();
    loader.register(dir, DEMO_CAMERA_LIBRARY, &factory_symbol(category), DemoCameraPlugin::create);
    loader
}

#[cfg(feature = "demo-plugins")]
crate::declare_plugin!(Sense_create: dyn SensePlugin = DemoSensePlugin::create);

#[cfg(feature = "demo-plugins")]
crate::declare_plugin!(SenseHw_create: dyn HardwarePlugin = DemoCameraPlugin::create);
