//! Grow phases and the authoritative catalog of their light durations and
//! target VPD bands.
//!
//! The five built-in phases carry fixed defaults. A device may additionally
//! define up to [`MAX_CUSTOM_PHASES`] custom phases, identified by their
//! display name, each with its own light duration and no VPD band.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CatalogError;
use crate::vpd::VpdBand;

pub const MAX_CUSTOM_PHASES: usize = 3;

/// Built-ins in the order the phase selector lists them.
pub const BUILTIN_PHASES: [Phase; 5] = [
    Phase::Seedling,
    Phase::Vegetative,
    Phase::Flowering,
    Phase::Drying,
    Phase::Curing,
];

// ---------------------------------------------------------------------------
// Phase identifier
// ---------------------------------------------------------------------------

#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub enum Phase {
    Seedling,
    #[default]
    Vegetative,
    Flowering,
    Drying,
    Curing,
    Custom(String),
}

impl Phase {
    /// Parse a phase identifier. Built-in ids match case-insensitively;
    /// any other non-blank text names a custom phase. Blank input is `None`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        Some(match s.to_ascii_lowercase().as_str() {
            "seedling" => Self::Seedling,
            "vegetative" => Self::Vegetative,
            "flowering" => Self::Flowering,
            "drying" => Self::Drying,
            "curing" => Self::Curing,
            _ => Self::Custom(s.to_string()),
        })
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Seedling => "seedling",
            Self::Vegetative => "vegetative",
            Self::Flowering => "flowering",
            Self::Drying => "drying",
            Self::Curing => "curing",
            Self::Custom(name) => name,
        }
    }

    pub fn is_builtin(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }

    fn builtin_hours(&self) -> Option<f64> {
        match self {
            Self::Seedling | Self::Vegetative => Some(18.0),
            Self::Flowering => Some(12.0),
            Self::Drying | Self::Curing => Some(0.0),
            Self::Custom(_) => None,
        }
    }

    fn builtin_band(&self) -> Option<VpdBand> {
        match self {
            Self::Seedling => Some(VpdBand::new(0.4, 0.8)),
            Self::Vegetative => Some(VpdBand::new(0.8, 1.2)),
            Self::Flowering => Some(VpdBand::new(1.2, 1.6)),
            Self::Drying => Some(VpdBand::new(0.8, 1.0)),
            Self::Curing => Some(VpdBand::new(0.5, 0.7)),
            Self::Custom(_) => None,
        }
    }

    fn builtin_display_name(&self) -> Option<&'static str> {
        match self {
            Self::Seedling => Some("Keimling"),
            Self::Vegetative => Some("Wachstum"),
            Self::Flowering => Some("Blüte"),
            Self::Drying => Some("Trocknen"),
            Self::Curing => Some("Veredelung"),
            Self::Custom(_) => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl TryFrom<String> for Phase {
    type Error = CatalogError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s).ok_or(CatalogError::EmptyPhase)
    }
}

impl From<Phase> for String {
    fn from(p: Phase) -> Self {
        p.id().to_string()
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// A user-defined phase: display name plus light hours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomPhase {
    pub name: String,
    pub hours: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseCatalog {
    custom: Vec<CustomPhase>,
}

impl PhaseCatalog {
    /// Catalog containing only the built-in phases.
    pub fn builtin() -> Self {
        Self::default()
    }

    /// Catalog with up to three custom phases, kept in slot order.
    pub fn with_custom(
        custom: impl IntoIterator<Item = CustomPhase>,
    ) -> Result<Self, CatalogError> {
        let custom: Vec<CustomPhase> = custom
            .into_iter()
            .map(|c| CustomPhase {
                name: c.name.trim().to_string(),
                hours: c.hours,
            })
            .collect();

        if custom.len() > MAX_CUSTOM_PHASES {
            return Err(CatalogError::InvalidCustomPhase(format!(
                "at most {MAX_CUSTOM_PHASES} custom phases allowed, got {}",
                custom.len()
            )));
        }

        for (i, c) in custom.iter().enumerate() {
            match Phase::parse(&c.name) {
                None => {
                    return Err(CatalogError::InvalidCustomPhase(format!(
                        "custom phase {} has an empty name",
                        i + 1
                    )))
                }
                Some(p) if p.is_builtin() => {
                    return Err(CatalogError::InvalidCustomPhase(format!(
                        "'{}' collides with a built-in phase",
                        c.name
                    )))
                }
                Some(_) => {}
            }
            if custom[..i].iter().any(|prev| prev.name == c.name) {
                return Err(CatalogError::InvalidCustomPhase(format!(
                    "duplicate custom phase '{}'",
                    c.name
                )));
            }
        }

        Ok(Self { custom })
    }

    pub fn custom_phases(&self) -> &[CustomPhase] {
        &self.custom
    }

    fn custom(&self, phase: &Phase) -> Option<&CustomPhase> {
        match phase {
            Phase::Custom(name) => self.custom.iter().find(|c| c.name == *name),
            _ => None,
        }
    }

    pub fn is_known(&self, phase: &Phase) -> bool {
        phase.is_builtin() || self.custom(phase).is_some()
    }

    /// Default light hours for `phase`. Custom phases return their configured
    /// hours as given; unregistered custom phases are `UnknownPhase`.
    pub fn default_duration_hours(&self, phase: &Phase) -> Result<f64, CatalogError> {
        if let Some(hours) = phase.builtin_hours() {
            return Ok(hours);
        }
        self.custom(phase)
            .map(|c| c.hours)
            .ok_or_else(|| CatalogError::UnknownPhase(phase.id().to_string()))
    }

    /// Target VPD band. Only built-ins have one.
    pub fn target_vpd_band(&self, phase: &Phase) -> Option<VpdBand> {
        phase.builtin_band()
    }

    pub fn display_name<'a>(&self, phase: &'a Phase) -> &'a str {
        match phase.builtin_display_name() {
            Some(name) => name,
            None => phase.id(),
        }
    }

    /// Selectable phases: built-ins first, then custom phases in slot order.
    pub fn phases(&self) -> Vec<Phase> {
        BUILTIN_PHASES
            .iter()
            .cloned()
            .chain(self.custom.iter().map(|c| Phase::Custom(c.name.clone())))
            .collect()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
