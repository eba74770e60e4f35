//! Exported C symbols, declared in `include/ivd.h`.
//!
//! Handles returned here stay valid until the environment they came from is
//! destroyed; afterwards every call on them is logged and ignored. Instance
//! handles of erased items turn stale the same way.

use std::ffi::{c_char, c_int, c_void};
use std::time::Duration;

use ivd_config::IvdConfig;

use crate::{
    CheckConstCallback, GetNumberCallback, GetStringCallback, IvdInstance, IvdModel, IvdRuntime, LIVE,
    SetNumberCallback, SetStringCallback, TriggerCallback, UserDataDestructor, c_key, instance, model, runtime,
    text,
};

// ----------------------------------------------------------------------------
// Environment
// ----------------------------------------------------------------------------

/// Create an environment configured from `ivd.toml` and `IVD_*` variables.
#[unsafe(no_mangle)]
pub extern "C" fn ivd_create_environment() -> *mut IvdRuntime {
    let _ = env_logger::try_init();
    let ptr = Box::into_raw(Box::new(IvdRuntime::new(IvdConfig::load())));
    LIVE.lock().insert(ptr as usize);
    log::info!("ivd_create_environment: {ptr:p}");
    ptr
}

/// Destroy an environment and every handle it gave out.
///
/// # Safety
/// `env` must come from [`ivd_create_environment`] and must not be used
/// afterwards, nor destroyed from inside one of its callbacks.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ivd_destroy_environment(env: *mut IvdRuntime) {
    if env.is_null() || !LIVE.lock().remove(&(env as usize)) {
        log::error!("ivd_destroy_environment: unknown handle {env:p}");
        return;
    }
    log::info!("ivd_destroy_environment: {env:p}");
    drop(unsafe { Box::from_raw(env) });
}

/// Register a root model container named `name`.
///
/// # Safety
/// `name` must be a valid C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ivd_environment_add_model(env: *mut IvdRuntime, name: *const c_char) -> *mut IvdModel {
    let Some(rt) = (unsafe { runtime(env) }) else { return std::ptr::null_mut() };
    let Some(name) = (unsafe { text(name) }) else {
        log::error!("ivd_environment_add_model: null name");
        return std::ptr::null_mut();
    };
    rt.with_inner(|inner| {
        let container = inner.env.add_model(&name);
        inner.model_handle(env, container)
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Load an element document. Returns one of the `IVD_STATUS_*` codes.
///
/// # Safety
/// `path` must be a valid C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ivd_environment_load_file(env: *mut IvdRuntime, path: *const c_char) -> c_int {
    let Some(rt) = (unsafe { runtime(env) }) else { return crate::IVD_STATUS_FILE_NOT_FOUND };
    let Some(path) = (unsafe { text(path) }) else { return crate::IVD_STATUS_FILE_NOT_FOUND };
    rt.with_inner(|inner| {
        let status = inner.env.load_file(&path);
        log::info!("ivd_environment_load_file: {path} -> {status:?}");
        status.as_status_code()
    })
    .unwrap_or(crate::IVD_STATUS_COMPILE_ERROR)
}

/// Report of the last failed load. Valid until the next call.
#[unsafe(no_mangle)]
pub extern "C" fn ivd_environment_get_compiler_errors(env: *mut IvdRuntime) -> *const c_char {
    let Some(rt) = (unsafe { runtime(env) }) else { return std::ptr::null() };
    rt.with_inner(|inner| {
        inner.errors = c_key(&inner.env.compiler_errors());
        inner.errors.as_ptr()
    })
    .unwrap_or(std::ptr::null())
}

/// Run one frame, then deliver its triggers. Returns 0 once the quit
/// trigger fired, 1 otherwise.
#[unsafe(no_mangle)]
pub extern "C" fn ivd_environment_run_frame(env: *mut IvdRuntime) -> c_int {
    let Some(rt) = (unsafe { runtime(env) }) else { return 0 };
    let Some(alive) = rt.with_inner(|inner| inner.env.run_frame()) else { return 0 };
    rt.deliver_triggers();
    c_int::from(alive)
}

/// Take over the calling thread until the quit trigger fires or the
/// configured frame limit is reached.
#[unsafe(no_mangle)]
pub extern "C" fn ivd_environment_run(env: *mut IvdRuntime) {
    let Some(rt) = (unsafe { runtime(env) }) else { return };
    let Some((sleep, limit)) = rt.with_inner(|inner| {
        let runtime = &inner.env.config().runtime;
        (Duration::from_millis(runtime.idle_sleep_ms), runtime.max_frames)
    }) else {
        return;
    };

    let mut frames = 0u64;
    loop {
        let Some((alive, idle)) = rt.with_inner(|inner| (inner.env.run_frame(), inner.env.is_idle())) else {
            return;
        };
        rt.deliver_triggers();
        frames += 1;
        if !alive || limit.is_some_and(|max| frames >= max) {
            log::info!("ivd_environment_run: stopped after {frames} frames");
            return;
        }
        if idle {
            std::thread::sleep(sleep);
        }
    }
}

// ----------------------------------------------------------------------------
// Model
// ----------------------------------------------------------------------------

#[unsafe(no_mangle)]
pub extern "C" fn ivd_model_add_instance(m: *mut IvdModel) -> *mut IvdInstance {
    let Some((rt, container)) = (unsafe { model(m) }) else { return std::ptr::null_mut() };
    rt.with_inner(|inner| match inner.env.models_mut().push_back_new(container) {
        Ok(item) => inner.instance_handle(rt, item),
        Err(e) => {
            log::warn!("ivd_model_add_instance: {e}");
            std::ptr::null_mut()
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

#[unsafe(no_mangle)]
pub extern "C" fn ivd_model_instance_count(m: *mut IvdModel) -> c_int {
    let Some((rt, container)) = (unsafe { model(m) }) else { return 0 };
    rt.with_inner(|inner| c_int::try_from(inner.env.models().len(container)).unwrap_or(c_int::MAX))
        .unwrap_or(0)
}

/// Queue `i` for removal; its display items go away on the next frame.
#[unsafe(no_mangle)]
pub extern "C" fn ivd_model_erase_later(m: *mut IvdModel, i: *mut IvdInstance) {
    let (Some((rt, container)), Some((_, item))) = (unsafe { model(m) }, unsafe { instance(i) }) else { return };
    rt.with_inner(|inner| {
        if inner.env.models().parent_container(item) != Some(container) {
            log::warn!("ivd_model_erase_later: {item} is not in {container}");
            return;
        }
        if let Err(e) = inner.env.models_mut().erase_later(item) {
            log::warn!("ivd_model_erase_later: {e}");
        }
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn ivd_container_swap(m: *mut IvdModel, a: *mut IvdInstance, b: *mut IvdInstance) {
    let (Some((rt, _)), Some((_, a)), Some((_, b))) = (unsafe { model(m) }, unsafe { instance(a) }, unsafe { instance(b) })
    else {
        return;
    };
    rt.with_inner(|inner| {
        if let Err(e) = inner.env.models_mut().swap(a, b) {
            log::warn!("ivd_container_swap: {e}");
        }
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn ivd_model_first(m: *mut IvdModel) -> *mut IvdInstance {
    let Some((rt, container)) = (unsafe { model(m) }) else { return std::ptr::null_mut() };
    rt.with_inner(|inner| match inner.env.models().first(container) {
        Some(item) => inner.instance_handle(rt, item),
        None => std::ptr::null_mut(),
    })
    .unwrap_or(std::ptr::null_mut())
}

// ----------------------------------------------------------------------------
// Instance
// ----------------------------------------------------------------------------

/// Create (or return) the child container `name` of an instance.
///
/// # Safety
/// `name` must be a valid C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ivd_instance_actualize_child_model(i: *mut IvdInstance, name: *const c_char) -> *mut IvdModel {
    let (Some((rt, item)), Some(name)) = (unsafe { instance(i) }, unsafe { text(name) }) else {
        return std::ptr::null_mut();
    };
    rt.with_inner(|inner| match inner.env.models_mut().instantiate_child_model(item, name.as_str()) {
        Ok(container) => inner.model_handle(rt, container),
        Err(e) => {
            log::warn!("ivd_instance_actualize_child_model: {e}");
            std::ptr::null_mut()
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

#[unsafe(no_mangle)]
pub extern "C" fn ivd_instance_get_child_model(i: *mut IvdInstance) -> *mut IvdModel {
    let Some((rt, item)) = (unsafe { instance(i) }) else { return std::ptr::null_mut() };
    rt.with_inner(|inner| match inner.env.models().child_container(item) {
        Some(container) => inner.model_handle(rt, container),
        None => std::ptr::null_mut(),
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Attach host data handed to every callback of the instance. `dtor` runs
/// when the data is replaced or the instance is freed.
#[unsafe(no_mangle)]
pub extern "C" fn ivd_instance_set_user_data(i: *mut IvdInstance, data: *mut c_void, dtor: UserDataDestructor) {
    let Some((rt, item)) = (unsafe { instance(i) }) else { return };
    let triggers = &rt.triggers;
    rt.with_inner(|inner| {
        if let Some(adapter) = inner.adapter(item, triggers) {
            adapter.set_user_data(data, dtor);
        }
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn ivd_instance_get_user_data(i: *mut IvdInstance) -> *mut c_void {
    let Some((rt, item)) = (unsafe { instance(i) }) else { return std::ptr::null_mut() };
    let triggers = &rt.triggers;
    rt.with_inner(|inner| inner.adapter(item, triggers).map_or(std::ptr::null_mut(), |a| a.user_data))
        .unwrap_or(std::ptr::null_mut())
}

#[unsafe(no_mangle)]
pub extern "C" fn ivd_instance_next(i: *mut IvdInstance) -> *mut IvdInstance {
    let Some((rt, item)) = (unsafe { instance(i) }) else { return std::ptr::null_mut() };
    rt.with_inner(|inner| match inner.env.models().next(item) {
        Some(next) => inner.instance_handle(rt, next),
        None => std::ptr::null_mut(),
    })
    .unwrap_or(std::ptr::null_mut())
}

/// # Safety
/// `key` must be a valid C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ivd_instance_set_state(i: *mut IvdInstance, key: *const c_char) {
    let (Some((rt, item)), Some(key)) = (unsafe { instance(i) }, unsafe { text(key) }) else { return };
    rt.with_inner(|inner| {
        if let Err(e) = inner.env.models_mut().set_state(item, &key) {
            log::warn!("ivd_instance_set_state: {e}");
        }
    });
}

/// # Safety
/// `key` must be a valid C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ivd_instance_unset_state(i: *mut IvdInstance, key: *const c_char) {
    let (Some((rt, item)), Some(key)) = (unsafe { instance(i) }, unsafe { text(key) }) else { return };
    rt.with_inner(|inner| {
        if let Err(e) = inner.env.models_mut().unset_state(item, &key) {
            log::warn!("ivd_instance_unset_state: {e}");
        }
    });
}

/// Write through the instance's number setter and re-layout what shows it.
///
/// # Safety
/// `key` must be a valid C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ivd_instance_set_number(i: *mut IvdInstance, key: *const c_char, value: f64) {
    let (Some((rt, item)), Some(key)) = (unsafe { instance(i) }, unsafe { text(key) }) else { return };
    rt.with_inner(|inner| {
        if let Err(e) = inner.env.models_mut().set_number(item, &key, value) {
            log::warn!("ivd_instance_set_number: {e}");
        }
    });
}

/// # Safety
/// `key` and `value` must be valid C strings.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ivd_instance_set_string(i: *mut IvdInstance, key: *const c_char, value: *const c_char) {
    let (Some((rt, item)), Some(key)) = (unsafe { instance(i) }, unsafe { text(key) }) else { return };
    let value = unsafe { text(value) }.unwrap_or_default();
    rt.with_inner(|inner| {
        if let Err(e) = inner.env.models_mut().set_string(item, &key, &value) {
            log::warn!("ivd_instance_set_string: {e}");
        }
    });
}

// ----------------------------------------------------------------------------
// Instance callbacks
// ----------------------------------------------------------------------------

fn install(i: *mut IvdInstance, name: &str, apply: impl FnOnce(&mut crate::CInstance)) {
    let Some((rt, item)) = (unsafe { instance(i) }) else { return };
    let triggers = &rt.triggers;
    rt.with_inner(|inner| match inner.adapter(item, triggers) {
        Some(adapter) => apply(adapter),
        None => log::warn!("{name}: cannot install callback on {item}"),
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn ivd_instance_set_number_getter(i: *mut IvdInstance, fun: GetNumberCallback) {
    install(i, "ivd_instance_set_number_getter", |a| a.get_number = fun);
}

#[unsafe(no_mangle)]
pub extern "C" fn ivd_instance_set_string_getter(i: *mut IvdInstance, fun: GetStringCallback) {
    install(i, "ivd_instance_set_string_getter", |a| a.get_string = fun);
}

#[unsafe(no_mangle)]
pub extern "C" fn ivd_instance_set_check_number_const(i: *mut IvdInstance, fun: CheckConstCallback) {
    install(i, "ivd_instance_set_check_number_const", |a| a.number_const = fun);
}

#[unsafe(no_mangle)]
pub extern "C" fn ivd_instance_set_check_string_const(i: *mut IvdInstance, fun: CheckConstCallback) {
    install(i, "ivd_instance_set_check_string_const", |a| a.string_const = fun);
}

#[unsafe(no_mangle)]
pub extern "C" fn ivd_instance_set_number_setter(i: *mut IvdInstance, fun: SetNumberCallback) {
    install(i, "ivd_instance_set_number_setter", |a| a.set_number = fun);
}

#[unsafe(no_mangle)]
pub extern "C" fn ivd_instance_set_string_setter(i: *mut IvdInstance, fun: SetStringCallback) {
    install(i, "ivd_instance_set_string_setter", |a| a.set_string = fun);
}

#[unsafe(no_mangle)]
pub extern "C" fn ivd_instance_set_trigger_callback(i: *mut IvdInstance, fun: TriggerCallback) {
    install(i, "ivd_instance_set_trigger_callback", |a| a.trigger = fun);
}
