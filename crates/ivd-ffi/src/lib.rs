//! C ABI for embedding the IVD runtime.
//!
//! A host creates an environment, registers model containers, fills them
//! with instances and installs per-instance callbacks that expose its data.
//! The functions live in [`ffi`]; this module holds the handle types and the
//! adapter that turns C function pointers into [`ModelCallbacks`].

pub mod ffi;

use std::any::Any;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::rc::Rc;

use ivd_config::IvdConfig;
use ivd_core::{ContainerId, Environment, ModelCallbacks, ModelItemId};
use once_cell::sync::Lazy;
use parking_lot::Mutex;

pub const IVD_STATUS_SUCCESS: c_int = 0;
pub const IVD_STATUS_FILE_NOT_FOUND: c_int = 1;
pub const IVD_STATUS_COMPILE_ERROR: c_int = 2;

pub type UserDataDestructor = Option<unsafe extern "C" fn(*mut c_void)>;
pub type GetNumberCallback = Option<unsafe extern "C" fn(*const c_char, *mut c_void) -> f64>;
pub type GetStringCallback = Option<unsafe extern "C" fn(*const c_char, *mut c_void) -> *const c_char>;
/// Returns 1 when the key is constant, 0 otherwise.
pub type CheckConstCallback = Option<unsafe extern "C" fn(*const c_char, *mut c_void) -> c_int>;
pub type SetNumberCallback = Option<unsafe extern "C" fn(*const c_char, f64, *mut c_void)>;
pub type SetStringCallback = Option<unsafe extern "C" fn(*const c_char, *const c_char, *mut c_void)>;
pub type TriggerCallback = Option<unsafe extern "C" fn(*const c_char, *mut c_void)>;

/// Addresses of every environment handed out and not yet destroyed.
static LIVE: Lazy<Mutex<HashSet<usize>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Addresses of the model and instance handles owned by live environments.
static HANDLES: Lazy<Mutex<HashSet<usize>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// A trigger waiting to be delivered once the frame has released the
/// runtime, so the host may call back into the API from its handler.
struct PendingTrigger {
    callback: unsafe extern "C" fn(*const c_char, *mut c_void),
    key: CString,
    user_data: *mut c_void,
}

type TriggerQueue = Rc<RefCell<Vec<PendingTrigger>>>;

/// Opaque environment handle.
pub struct IvdRuntime {
    inner: Mutex<Inner>,
    triggers: TriggerQueue,
}

/// Opaque handle of a model container.
pub struct IvdModel {
    runtime: *const IvdRuntime,
    container: ContainerId,
}

/// Opaque handle of a model item.
pub struct IvdInstance {
    runtime: *const IvdRuntime,
    item: ModelItemId,
}

struct Inner {
    env: Environment,
    /// Handles stay allocated until the environment is destroyed so that
    /// pointers held by the host never dangle.
    models: HashMap<ContainerId, Box<IvdModel>>,
    instances: HashMap<ModelItemId, Box<IvdInstance>>,
    errors: CString,
}

impl Inner {
    fn model_handle(&mut self, runtime: *const IvdRuntime, container: ContainerId) -> *mut IvdModel {
        let handle = self.models.entry(container).or_insert_with(|| Box::new(IvdModel { runtime, container }));
        let ptr: *mut IvdModel = &mut **handle;
        HANDLES.lock().insert(ptr as usize);
        ptr
    }

    fn instance_handle(&mut self, runtime: *const IvdRuntime, item: ModelItemId) -> *mut IvdInstance {
        let handle = self.instances.entry(item).or_insert_with(|| Box::new(IvdInstance { runtime, item }));
        let ptr: *mut IvdInstance = &mut **handle;
        HANDLES.lock().insert(ptr as usize);
        ptr
    }

    /// The C adapter of `item`, installed on first use.
    fn adapter(&mut self, item: ModelItemId, triggers: &TriggerQueue) -> Option<&mut CInstance> {
        let store = self.env.models_mut();
        let installed = match store.callbacks_mut(item) {
            Ok(Some(callbacks)) => callbacks.as_any_mut().is_some_and(|a| a.is::<CInstance>()),
            Ok(None) => false,
            Err(e) => {
                log::warn!("instance {item}: {e}");
                return None;
            }
        };
        if !installed {
            if let Err(e) = store.set_callbacks(item, Box::new(CInstance::new(Rc::clone(triggers)))) {
                log::warn!("instance {item}: {e}");
                return None;
            }
        }
        store.callbacks_mut(item).ok().flatten()?.as_any_mut()?.downcast_mut::<CInstance>()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let mut handles = HANDLES.lock();
        for model in self.models.values() {
            handles.remove(&(&**model as *const IvdModel as usize));
        }
        for instance in self.instances.values() {
            handles.remove(&(&**instance as *const IvdInstance as usize));
        }
    }
}

impl IvdRuntime {
    fn new(config: IvdConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                env: Environment::with_config(config),
                models: HashMap::new(),
                instances: HashMap::new(),
                errors: CString::default(),
            }),
            triggers: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Runs `f` with the runtime locked. Calls made from inside a callback
    /// while a frame runs are refused.
    fn with_inner<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> Option<R> {
        match self.inner.try_lock() {
            Some(mut guard) => Some(f(&mut guard)),
            None => {
                log::error!("IVD runtime called re-entrantly from a model callback, ignoring");
                None
            }
        }
    }

    fn deliver_triggers(&self) {
        let pending = std::mem::take(&mut *self.triggers.borrow_mut());
        for trigger in pending {
            log::debug!("delivering trigger {:?}", trigger.key);
            unsafe { (trigger.callback)(trigger.key.as_ptr(), trigger.user_data) };
        }
    }
}

/// Registered handles only. Guards against stale or foreign pointers.
unsafe fn runtime<'a>(ptr: *const IvdRuntime) -> Option<&'a IvdRuntime> {
    if ptr.is_null() || !LIVE.lock().contains(&(ptr as usize)) {
        log::error!("invalid IVD runtime handle {ptr:p}");
        return None;
    }
    Some(unsafe { &*ptr })
}

/// Handles are only dereferenced while the environment owning them lives.
fn is_live_handle(addr: usize) -> bool {
    addr != 0 && HANDLES.lock().contains(&addr)
}

unsafe fn model<'a>(ptr: *const IvdModel) -> Option<(&'a IvdRuntime, ContainerId)> {
    if !is_live_handle(ptr as usize) {
        log::error!("invalid model handle {ptr:p}");
        return None;
    }
    let handle = unsafe { &*ptr };
    Some((unsafe { runtime(handle.runtime) }?, handle.container))
}

unsafe fn instance<'a>(ptr: *const IvdInstance) -> Option<(&'a IvdRuntime, ModelItemId)> {
    if !is_live_handle(ptr as usize) {
        log::error!("invalid instance handle {ptr:p}");
        return None;
    }
    let handle = unsafe { &*ptr };
    Some((unsafe { runtime(handle.runtime) }?, handle.item))
}

/// Borrowed C string as UTF-8, lossy.
unsafe fn text(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

fn c_key(key: &str) -> CString {
    CString::new(key.replace('\0', "")).unwrap_or_default()
}

/// Model callbacks backed by C function pointers and the host's user data.
struct CInstance {
    user_data: *mut c_void,
    user_data_dtor: UserDataDestructor,
    get_number: GetNumberCallback,
    get_string: GetStringCallback,
    number_const: CheckConstCallback,
    string_const: CheckConstCallback,
    set_number: SetNumberCallback,
    set_string: SetStringCallback,
    trigger: TriggerCallback,
    triggers: TriggerQueue,
}

impl CInstance {
    fn new(triggers: TriggerQueue) -> Self {
        Self {
            user_data: std::ptr::null_mut(),
            user_data_dtor: None,
            get_number: None,
            get_string: None,
            number_const: None,
            string_const: None,
            set_number: None,
            set_string: None,
            trigger: None,
            triggers,
        }
    }

    fn set_user_data(&mut self, data: *mut c_void, dtor: UserDataDestructor) {
        if data != self.user_data {
            self.release_user_data();
        }
        self.user_data = data;
        self.user_data_dtor = dtor;
    }

    fn release_user_data(&mut self) {
        if let Some(dtor) = self.user_data_dtor.take() {
            if !self.user_data.is_null() {
                unsafe { dtor(self.user_data) };
            }
        }
        self.user_data = std::ptr::null_mut();
    }
}

impl Drop for CInstance {
    fn drop(&mut self) {
        self.release_user_data();
    }
}

impl ModelCallbacks for CInstance {
    fn get_number(&self, key: &str) -> f64 {
        match self.get_number {
            Some(f) => unsafe { f(c_key(key).as_ptr(), self.user_data) },
            None => {
                log::warn!("no number getter installed for {key}");
                0.0
            }
        }
    }

    fn get_string(&self, key: &str) -> String {
        match self.get_string {
            Some(f) => unsafe { text(f(c_key(key).as_ptr(), self.user_data)) }.unwrap_or_default(),
            None => {
                log::warn!("no string getter installed for {key}");
                String::new()
            }
        }
    }

    fn set_number(&mut self, key: &str, value: f64) {
        match self.set_number {
            Some(f) => unsafe { f(c_key(key).as_ptr(), value, self.user_data) },
            None => log::warn!("no number setter installed for {key}"),
        }
    }

    fn set_string(&mut self, key: &str, value: &str) {
        match self.set_string {
            Some(f) => unsafe { f(c_key(key).as_ptr(), c_key(value).as_ptr(), self.user_data) },
            None => log::warn!("no string setter installed for {key}"),
        }
    }

    fn is_number_const(&self, key: &str) -> bool {
        self.number_const.is_some_and(|f| unsafe { f(c_key(key).as_ptr(), self.user_data) } != 0)
    }

    fn is_string_const(&self, key: &str) -> bool {
        self.string_const.is_some_and(|f| unsafe { f(c_key(key).as_ptr(), self.user_data) } != 0)
    }

    fn on_trigger(&mut self, key: &str) {
        match self.trigger {
            Some(callback) => self.triggers.borrow_mut().push(PendingTrigger {
                callback,
                key: c_key(key),
                user_data: self.user_data,
            }),
            None => log::warn!("trigger {key} dropped, no trigger callback installed"),
        }
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        Some(self)
    }
}
