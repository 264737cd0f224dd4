//! Parse configuration.
//!
//! A flat options value handed in at parse start. The decoding core never
//! consults the process environment; everything tunable arrives here.

/// Unit systems a source file can declare for its coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnitSystem {
    #[default]
    Meters,
    Kilometers,
    Feet,
    Inches,
    NauticalMiles,
}

impl UnitSystem {
    pub fn meters_per_unit(self) -> f64 {
        match self {
            UnitSystem::Meters => 1.0,
            UnitSystem::Kilometers => 1000.0,
            UnitSystem::Feet => 0.3048,
            UnitSystem::Inches => 0.0254,
            UnitSystem::NauticalMiles => 1852.0,
        }
    }

    /// Scale converting coordinates in `self` into `target` units.
    pub fn scale_to(self, target: UnitSystem) -> f64 {
        self.meters_per_unit() / target.meters_per_unit()
    }
}

/// Options shared by both format front ends.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Convert source coordinates into `target_units`. When false the
    /// numbers in the file are passed through untouched.
    pub convert_units: bool,
    /// Unit system of the emitted scene.
    pub target_units: UnitSystem,
    /// Let a texture's alpha channel mark otherwise opaque geometry as
    /// transparent.
    pub use_texture_alpha_for_transparency: bool,
    /// Keep object containers as scene nodes instead of splicing their
    /// children into the parent.
    pub keep_object_nodes: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            convert_units: true,
            target_units: UnitSystem::Meters,
            use_texture_alpha_for_transparency: true,
            keep_object_nodes: true,
        }
    }
}

impl ParseOptions {
    pub fn with_target_units(mut self, units: UnitSystem) -> Self {
        self.target_units = units;
        self
    }

    pub fn without_unit_conversion(mut self) -> Self {
        self.convert_units = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = ParseOptions::default();
        assert!(opts.convert_units);
        assert_eq!(opts.target_units, UnitSystem::Meters);
        assert!(opts.use_texture_alpha_for_transparency);
        assert!(opts.keep_object_nodes);
    }

    #[test]
    fn test_unit_scales() {
        assert_eq!(UnitSystem::Meters.scale_to(UnitSystem::Meters), 1.0);
        assert!((UnitSystem::Feet.scale_to(UnitSystem::Meters) - 0.3048).abs() < 1e-9);
        assert!((UnitSystem::Kilometers.scale_to(UnitSystem::Meters) - 1000.0).abs() < 1e-9);
        assert!((UnitSystem::Meters.scale_to(UnitSystem::Feet) - 1.0 / 0.3048).abs() < 1e-9);
        assert!((UnitSystem::NauticalMiles.scale_to(UnitSystem::Meters) - 1852.0).abs() < 1e-9);
    }
}
