//! Enumerator configuration

use crate::utils::errors::{MapSchedError, MapSchedResult};
use serde::{Deserialize, Serialize};

/// Largest accepted tile exponent; keeps `2^k` well inside `i64`.
const MAX_EXPONENT: u32 = 30;

/// Configuration for the map-schedule enumerator
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumeratorConfig {
    /// Smallest tile exponent; tile sizes are `2^k`
    pub min_tile_exp: u32,

    /// Largest tile exponent (inclusive)
    pub max_tile_exp: u32,

    /// Vector widths to try, in order
    pub vector_widths: Vec<u32>,

    /// Validate the input fragment before enumeration starts
    pub validate_input: bool,
}

impl Default for EnumeratorConfig {
    fn default() -> Self {
        Self {
            min_tile_exp: 0,
            max_tile_exp: 8,
            vector_widths: vec![1, 2, 4, 8, 16],
            validate_input: true,
        }
    }
}

impl EnumeratorConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tile exponent range
    pub fn tile_exponents(mut self, min: u32, max: u32) -> Self {
        self.min_tile_exp = min;
        self.max_tile_exp = max;
        self
    }

    /// Set vector widths to try
    pub fn vector_widths(mut self, widths: Vec<u32>) -> Self {
        self.vector_widths = widths;
        self
    }

    /// Enable/disable input validation
    pub fn validate_input(mut self, v: bool) -> Self {
        self.validate_input = v;
        self
    }

    /// Quick preset (small tiles, two widths)
    pub fn quick() -> Self {
        Self {
            max_tile_exp: 4,
            vector_widths: vec![1, 4],
            ..Default::default()
        }
    }

    /// Thorough preset (tiles up to 1024, widths up to 32)
    pub fn thorough() -> Self {
        Self {
            max_tile_exp: 10,
            vector_widths: vec![1, 2, 4, 8, 16, 32],
            ..Default::default()
        }
    }

    /// Tile sizes `2^k` for every configured exponent, ascending.
    pub fn tile_sizes(&self) -> Vec<i64> {
        (self.min_tile_exp..=self.max_tile_exp).map(|k| 1i64 << k).collect()
    }

    /// Check that the configuration describes a non-empty search space.
    pub fn validate(&self) -> MapSchedResult<()> {
        if self.min_tile_exp > self.max_tile_exp {
            return Err(MapSchedError::InvalidConfig(format!(
                "tile exponent range {}..={} is empty",
                self.min_tile_exp, self.max_tile_exp
            )));
        }
        if self.max_tile_exp > MAX_EXPONENT {
            return Err(MapSchedError::InvalidConfig(format!(
                "tile exponent {} exceeds {}",
                self.max_tile_exp, MAX_EXPONENT
            )));
        }
        if self.vector_widths.is_empty() {
            return Err(MapSchedError::InvalidConfig("no vector widths".to_string()));
        }
        if self.vector_widths.contains(&0) {
            return Err(MapSchedError::InvalidConfig("vector width 0".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tile_sizes() {
        let config = EnumeratorConfig::default();
        let sizes = config.tile_sizes();
        assert_eq!(sizes.len(), 9);
        assert_eq!(sizes.first(), Some(&1));
        assert_eq!(sizes.last(), Some(&256));
        assert_eq!(config.vector_widths, vec![1, 2, 4, 8, 16]);
    }

    #[test]
    fn test_presets_are_valid() {
        for config in [EnumeratorConfig::quick(), EnumeratorConfig::thorough(), EnumeratorConfig::new()] {
            assert!(config.validate().is_ok());
        }
        assert_eq!(EnumeratorConfig::thorough().tile_sizes().last(), Some(&1024));
    }

    #[test]
    fn test_invalid_configs() {
        let empty_range = EnumeratorConfig::new().tile_exponents(3, 2);
        assert!(matches!(empty_range.validate(), Err(MapSchedError::InvalidConfig(_))));

        let zero_width = EnumeratorConfig::new().vector_widths(vec![1, 0]);
        assert!(zero_width.validate().is_err());

        let no_width = EnumeratorConfig::new().vector_widths(Vec::new());
        assert!(no_width.validate().is_err());

        let huge = EnumeratorConfig::new().tile_exponents(0, 40);
        assert!(huge.validate().is_err());
    }
}
