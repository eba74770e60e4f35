//! Well-known state identities set by the runtime and its drivers.

pub const QUIT_TRIGGER: &str = "IVD-Core-Quit";
pub const MOUSE_PATH: &str = "IVD-Mouse";

pub fn button_active(button: &str) -> String {
    format!("{button}-Active")
}

pub fn button_press(button: &str) -> String {
    format!("{button}-Press")
}

pub fn button_release(button: &str) -> String {
    format!("{button}-Release")
}

pub mod item {
    pub const HOVER: &str = "IVD-Item-Hover";
    pub const MODEL_CHANGED: &str = "Model-Changed";
}

/// Window states are scoped to the window's root display item.
pub mod window {
    pub const VISIBLE: &str = "IVD-Window-Visible";
    pub const HIDDEN: &str = "IVD-Window-Hidden";
    /// Trigger, set whenever the window turns visible.
    pub const SHOWN: &str = "IVD-Window-Shown";
    /// Trigger, set once the window's geometry is first resolved.
    pub const INITIALIZED: &str = "IVD-Window-Initialized";
    pub const MOUSE_FOCUS: &str = "IVD-Window-Focus-Mouse";
    /// Trigger.
    pub const CLOSE_REQUEST: &str = "IVD-Window-Close";
}

pub mod app {
    /// Trigger, set when the last window is asked to close.
    pub const CLOSE: &str = "IVD-Close";
}

pub mod key {
    /// Trigger, set by every key press.
    pub const ANY: &str = "IVD-Any-Key";

    /// Positional scan-code name such as `IVD-Scan-Q` or `IVD-Scan-Return`.
    pub fn scan(name: &str) -> String {
        format!("IVD-Scan-{name}")
    }
}

pub mod mouse {
    pub const LEFT: &str = "IVD-Mouse-Left";
    pub const MIDDLE: &str = "IVD-Mouse-Middle";
    pub const RIGHT: &str = "IVD-Mouse-Right";
    /// Trigger.
    pub const MOTION: &str = "IVD-Mouse-Motion";

    pub fn is_button(name: &str) -> bool {
        [LEFT, MIDDLE, RIGHT].contains(&name)
    }
}
