//! Configuration for the reconstruction engine.
//!
//! An [`EngineConfig`] is an immutable value shared by every function of a
//! batch. It selects which idioms may be recognized, bounds region nesting, and
//! carries the operator name table used for rendering.

use bitflags::bitflags;

use crate::forms::OperatorTable;

bitflags! {
    /// Idiom and fold families the engine may apply.
    ///
    /// Disabling a family never makes reconstruction fail: the instructions it
    /// would have combined are kept in a more literal form instead.
    #[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
    pub struct IdiomSet: u16 {
        /// Compare-and-negate branch becomes `(abs x)`
        const ABS = 0x0001;
        /// Sign-tested variable shift becomes `(ash x n)`
        const ASH = 0x0002;
        /// Tag-test dispatch becomes `(rtype-of x)`
        const TYPE_OF = 0x0004;
        /// Compare plus conditional move between the compared registers becomes `min`/`max`
        const MIN_MAX = 0x0008;
        /// Compare, `#t` move and conditional `#f` move become one condition
        const BOOLEAN_CMOVE = 0x0010;
        /// Float compare and flag branch become one condition
        const FLOAT_COMPARE = 0x0020;
        /// Divide plus `hi`/`lo` read become `/` or `mod`
        const DIVISION = 0x0040;
        /// Typed memory offsets become `(-> base field)`
        const FIELD_ACCESS = 0x0080;
    }
}

impl Default for IdiomSet {
    fn default() -> Self {
        IdiomSet::all()
    }
}

/// Configuration for the reconstruction engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Idiom families that may be applied (default: all).
    pub idioms: IdiomSet,

    /// Maximum nesting depth of control regions (default: 256).
    pub max_region_depth: usize,

    /// Turn a trailing assignment of the return register into the function's
    /// value (default: true).
    pub strip_return_value: bool,

    /// Insert casts where operand types disagree with an operator's
    /// expectations (default: true).
    pub insert_casts: bool,

    /// Names used when rendering fixed operators.
    pub operators: OperatorTable,

    /// Line width targeted by pretty rendering (default: 100).
    pub render_width: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            idioms: IdiomSet::all(),
            max_region_depth: 256,
            strip_return_value: true,
            insert_casts: true,
            operators: OperatorTable::default(),
            render_width: 100,
        }
    }
}

impl EngineConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration with every idiom disabled.
    ///
    /// Intended for retrying a function whose reconstruction failed: control
    /// structures are still recognized, but multi-instruction idioms are left
    /// in literal form.
    #[must_use]
    pub fn reduced() -> Self {
        Self {
            idioms: IdiomSet::empty(),
            ..Self::default()
        }
    }

    /// Returns a copy with `idioms` as the enabled idiom families.
    #[must_use]
    pub fn with_idioms(mut self, idioms: IdiomSet) -> Self {
        self.idioms = idioms;
        self
    }

    /// Returns a copy with the given region depth limit.
    #[must_use]
    pub fn with_max_region_depth(mut self, depth: usize) -> Self {
        self.max_region_depth = depth;
        self
    }

    /// Returns a copy with cast insertion switched on or off.
    #[must_use]
    pub fn with_casts(mut self, insert_casts: bool) -> Self {
        self.insert_casts = insert_casts;
        self
    }

    /// Returns `true` if every idiom in `idioms` is enabled.
    #[must_use]
    pub fn allows(&self, idioms: IdiomSet) -> bool {
        self.idioms.contains(idioms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert!(config.allows(IdiomSet::ABS | IdiomSet::DIVISION));
        assert_eq!(config.max_region_depth, 256);
        assert!(config.strip_return_value);
        assert!(config.insert_casts);
    }

    #[test]
    fn reduced_disables_idioms_only() {
        let config = EngineConfig::reduced();
        assert!(config.idioms.is_empty());
        assert!(!config.allows(IdiomSet::ABS));
        assert!(config.insert_casts);
        assert_eq!(config.render_width, 100);
    }
}
