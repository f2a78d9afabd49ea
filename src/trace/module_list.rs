//! The ordered module-name list stream.

use crate::{
    registry::{ModuleId, ModuleRegistry},
    Result,
};

/// The module-list name of the anonymous pseudo-unit.
pub const ANONYMOUS_UNIT_NAME: &str = "<anonymous>";

/// The module-name list of one trace: ordered text lines, one unit name per line,
/// consumed in module-index order.
///
/// Node records reference modules by index into this list, so order is
/// significant and names must not contain newlines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleList {
    names: Vec<String>,
}

impl ModuleList {
    /// Creates a list from names in module-index order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if a name contains a newline.
    pub fn from_names<I: IntoIterator<Item = String>>(names: I) -> Result<Self> {
        let names: Vec<String> = names.into_iter().collect();
        for name in &names {
            if name.contains('\n') || name.contains('\r') {
                return Err(malformed_error!("Module name contains a newline: {:?}", name));
            }
        }
        Ok(ModuleList { names })
    }

    /// Parses a module list stream.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the stream is not valid UTF-8.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| malformed_error!("Module list stream is not valid UTF-8"))?;
        let names = text
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Ok(ModuleList { names })
    }

    /// Encodes the list as a stream.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = String::new();
        for name in &self.names {
            out.push_str(name);
            out.push('\n');
        }
        out.into_bytes()
    }

    /// Returns the number of listed modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns `true` if no modules are listed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterates the names in module-index order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Resolves every listed name against the registry, in module-index order.
    ///
    /// The literal name `<anonymous>` denotes the anonymous pseudo-unit and
    /// resolves without a registry entry.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] for a name the registry does not know;
    /// the registry is read-only during loading, so an unknown unit indicates a
    /// configuration/trace mismatch.
    pub fn resolve(&self, registry: &ModuleRegistry) -> Result<Vec<ModuleId>> {
        self.names
            .iter()
            .map(|name| {
                if name == ANONYMOUS_UNIT_NAME {
                    return Ok(ModuleId::ANONYMOUS);
                }
                registry
                    .unit_by_name(name)
                    .map(|unit| unit.id)
                    .ok_or_else(|| malformed_error!("Unknown module in trace list: {}", name))
            })
            .collect()
    }
}
