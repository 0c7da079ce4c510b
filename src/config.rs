//! View configuration shared by the renderer and the front-ends.

/// Horizontal resolution mode of the column/span drawers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Detail {
    #[default]
    High,
    /// Half horizontal resolution, every column written twice.
    Low,
}

impl Detail {
    #[inline]
    pub fn shift(self) -> i32 {
        match self {
            Detail::High => 0,
            Detail::Low => 1,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("view size {0}x{1} is too small")]
    TooSmall(usize, usize),

    #[error("view size {0}x{1} exceeds the {2} pixel limit")]
    TooLarge(usize, usize, usize),

    #[error("low detail needs an even width, got {0}")]
    OddWidth(usize),
}

/// Screen area the pipeline renders into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderConfig {
    pub width: usize,
    pub height: usize,
    pub detail: Detail,
}

impl RenderConfig {
    /// Clip columns are `i16` and plane rows `u16`, which bounds the size.
    pub const MAX_DIM: usize = 4096;

    pub fn new(width: usize, height: usize, detail: Detail) -> Result<Self, ConfigError> {
        let cfg = Self {
            width,
            height,
            detail,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width < 16 || self.height < 16 {
            return Err(ConfigError::TooSmall(self.width, self.height));
        }
        if self.width > Self::MAX_DIM || self.height > Self::MAX_DIM {
            return Err(ConfigError::TooLarge(
                self.width,
                self.height,
                Self::MAX_DIM,
            ));
        }
        if self.detail == Detail::Low && self.width % 2 != 0 {
            return Err(ConfigError::OddWidth(self.width));
        }
        Ok(())
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 320,
            height: 200,
            detail: Detail::High,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_classic_resolution() {
        let cfg = RenderConfig::default();
        assert_eq!((cfg.width, cfg.height), (320, 200));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_bad_sizes() {
        assert_eq!(
            RenderConfig::new(8, 200, Detail::High).unwrap_err(),
            ConfigError::TooSmall(8, 200)
        );
        assert_eq!(
            RenderConfig::new(321, 200, Detail::Low).unwrap_err(),
            ConfigError::OddWidth(321)
        );
        assert!(RenderConfig::new(9000, 200, Detail::High).is_err());
    }
}
