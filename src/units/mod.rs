//! Unit naming model
//!
//! Canonical names have the form `prefix[@instance].type`. A template has an
//! empty instance (`foo@.service`) and only generates instances; an instance
//! (`foo@tty1.service`) is a real graph node. This module also carries the
//! systemd path escaping rules (`/var/log` <-> `var-log`) used by mount,
//! swap and device unit names, and specifier substitution for template
//! instantiation.

pub mod known;
pub mod parser;

pub use parser::{parse_file, parse_unit_file, string_to_bool, Directive, ParseError};

use serde::{Deserialize, Serialize};

/// Unit type, taken from the name suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitType {
    Service,
    Socket,
    Device,
    Mount,
    Automount,
    Swap,
    Target,
    Path,
    Timer,
    Slice,
    Scope,
}

impl UnitType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "service" => Some(Self::Service),
            "socket" => Some(Self::Socket),
            "device" => Some(Self::Device),
            "mount" => Some(Self::Mount),
            "automount" => Some(Self::Automount),
            "swap" => Some(Self::Swap),
            "target" => Some(Self::Target),
            "path" => Some(Self::Path),
            "timer" => Some(Self::Timer),
            "slice" => Some(Self::Slice),
            "scope" => Some(Self::Scope),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Socket => "socket",
            Self::Device => "device",
            Self::Mount => "mount",
            Self::Automount => "automount",
            Self::Swap => "swap",
            Self::Target => "target",
            Self::Path => "path",
            Self::Timer => "timer",
            Self::Slice => "slice",
            Self::Scope => "scope",
        }
    }
}

impl std::fmt::Display for UnitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed unit name: `prefix[@instance].type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitName {
    pub prefix: String,
    /// `None` for plain units, `Some("")` for templates, `Some(instance)`
    /// for template instances.
    pub instance: Option<String>,
    pub unit_type: UnitType,
}

impl UnitName {
    /// Parse a unit name. Returns `None` when the suffix is not a known
    /// unit type or the name is degenerate (empty prefix).
    pub fn parse(name: &str) -> Option<Self> {
        let (stem, suffix) = name.rsplit_once('.')?;
        let unit_type = UnitType::parse(suffix)?;
        if stem.is_empty() {
            return None;
        }

        let (prefix, instance) = match stem.split_once('@') {
            Some((prefix, instance)) => (prefix, Some(instance.to_string())),
            None => (stem, None),
        };
        if prefix.is_empty() {
            return None;
        }

        Some(Self {
            prefix: prefix.to_string(),
            instance,
            unit_type,
        })
    }

    pub fn is_template(&self) -> bool {
        self.instance.as_deref() == Some("")
    }

    pub fn is_instance(&self) -> bool {
        self.instance.as_deref().map_or(false, |i| !i.is_empty())
    }

    /// The full canonical name, e.g. `getty@tty1.service`.
    pub fn full_name(&self) -> String {
        match &self.instance {
            Some(instance) => format!("{}@{}.{}", self.prefix, instance, self.unit_type),
            None => format!("{}.{}", self.prefix, self.unit_type),
        }
    }

    /// For an instance, the name of the template that generates it
    /// (`getty@tty1.service` -> `getty@.service`).
    pub fn template_name(&self) -> Option<String> {
        if self.is_instance() {
            Some(format!("{}@.{}", self.prefix, self.unit_type))
        } else {
            None
        }
    }
}

impl std::fmt::Display for UnitName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// Escape a filesystem path into a unit name stem:
/// `/var/log` -> `var-log`, `/` -> `-`. Dashes and other special characters
/// in path components become `\xXX` sequences so the mapping is reversible.
pub fn escape_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return "-".to_string();
    }

    let mut out = String::new();
    for (i, component) in trimmed.split('/').filter(|c| !c.is_empty()).enumerate() {
        if i > 0 {
            out.push('-');
        }
        for (j, b) in component.bytes().enumerate() {
            let ok = b.is_ascii_alphanumeric() || b == b':' || b == b'_' || (b == b'.' && j > 0);
            if ok {
                out.push(b as char);
            } else {
                out.push_str(&format!("\\x{:02x}", b));
            }
        }
    }
    out
}

/// Undo [`escape_path`]: `var-log` -> `/var/log`, `-` -> `/`.
pub fn unescape_path(escaped: &str) -> String {
    if escaped == "-" {
        return "/".to_string();
    }
    format!("/{}", unescape(escaped))
}

/// Undo escaping without anchoring at `/`: dashes become slashes, then
/// `\xXX` sequences are decoded. Used for `%I` and instance strings.
pub fn unescape(escaped: &str) -> String {
    decode_escapes(&escaped.replace('-', "/"))
}

/// Decode `\xXX` escape sequences; anything malformed is kept verbatim.
pub fn decode_escapes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\'
            && i + 3 < bytes.len()
            && bytes[i + 1] == b'x'
            && bytes[i + 2].is_ascii_hexdigit()
            && bytes[i + 3].is_ascii_hexdigit()
        {
            let hex = std::str::from_utf8(&bytes[i + 2..i + 4]).unwrap_or("00");
            if let Ok(b) = u8::from_str_radix(hex, 16) {
                out.push(b as char);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i] as char);
        i += 1;
    }
    out
}

/// The mount point controlled by a mount unit name
/// (`var-log.mount` -> `/var/log`).
pub fn mount_path_from_name(name: &str) -> Option<String> {
    let parsed = UnitName::parse(name)?;
    if parsed.unit_type != UnitType::Mount {
        return None;
    }
    Some(unescape_path(&parsed.prefix))
}

/// The mount unit name covering a path (`/var/log` -> `var-log.mount`).
pub fn mount_name_from_path(path: &str) -> String {
    format!("{}.mount", escape_path(path))
}

/// The device unit name for a device node (`/dev/sda1` -> `dev-sda1.device`).
pub fn device_name_from_path(path: &str) -> String {
    format!("{}.device", escape_path(path))
}

/// The device unit for a network interface named by `BindToDevice=`.
pub fn device_name_from_interface(interface: &str) -> String {
    format!("sys-subsystem-net-devices-{}.device", escape_path(interface))
}

/// The parent of a slice in the dash hierarchy:
/// `a-b.slice` -> `a.slice`, `a.slice` -> `-.slice`, `-.slice` -> root.
pub fn slice_parent(name: &str) -> Option<String> {
    let stem = name.strip_suffix(".slice")?;
    if stem == "-" {
        return None;
    }
    match stem.rsplit_once('-') {
        Some((parent, _)) if !parent.is_empty() => Some(format!("{}.slice", parent)),
        _ => Some("-.slice".to_string()),
    }
}

/// Substitute specifiers in a directive value for a given unit identity.
/// Returns the expanded string and any unknown specifier sequences, which
/// are left verbatim.
pub fn expand_specifiers(value: &str, name: &UnitName) -> (String, Vec<String>) {
    let instance = name.instance.clone().unwrap_or_default();
    let unescaped_instance = unescape(&instance);

    let mut out = String::with_capacity(value.len());
    let mut unknown = Vec::new();
    let mut chars = value.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('i') => out.push_str(&instance),
            Some('I') => out.push_str(&unescaped_instance),
            Some('n') => out.push_str(&name.full_name()),
            Some('N') => match &name.instance {
                Some(instance) => out.push_str(&format!("{}@{}", name.prefix, instance)),
                None => out.push_str(&name.prefix),
            },
            Some('p') => out.push_str(&name.prefix),
            Some('f') => {
                if name.is_instance() {
                    out.push('/');
                    out.push_str(&unescaped_instance);
                } else {
                    out.push_str(&unescape_path(&name.prefix));
                }
            }
            Some(other) => {
                out.push('%');
                out.push(other);
                unknown.push(format!("%{}", other));
            }
            None => out.push('%'),
        }
    }

    (out, unknown)
}
