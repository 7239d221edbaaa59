use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Nominal Z boson mass in GeV.
pub const Z_MASS: f64 = 91.1876;

/// Cut values and switches of the OS-Method quartet selection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SelectionConfig {
    /// Accept same-sign or different-flavor dileptons.
    pub allow_wrong_charge_flavor: bool,
    /// Let the Z1 candidate be built from leptons failing the tight
    /// selection. Also relaxes the nominal-mass priority rule.
    pub allow_z1_failing_leptons: bool,
    /// Open interval for the FSR-inclusive dilepton mass.
    pub z_mass_window: (f64, f64),
    pub z1_min_mass: f64,
    pub ghost_delta_r: f64,
    pub leading_pt: f64,
    pub subleading_pt: f64,
    pub qcd_min_mass: f64,
    pub smart_cut_min_mass: f64,
    pub m4l_min: f64,
    /// Quartets with more failing leptons are outside every control region.
    pub max_failing_leptons: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            allow_wrong_charge_flavor: false,
            allow_z1_failing_leptons: true,
            z_mass_window: (12.0, 120.0),
            z1_min_mass: 40.0,
            ghost_delta_r: 0.02,
            leading_pt: 20.0,
            subleading_pt: 10.0,
            qcd_min_mass: 4.0,
            smart_cut_min_mass: 12.0,
            m4l_min: 70.0,
            max_failing_leptons: 2,
        }
    }
}

impl SelectionConfig {
    pub fn validate(&self) -> Result<()> {
        let (lo, hi) = self.z_mass_window;
        if !(lo < hi) {
            return Err(Error::Config(format!(
                "empty Z mass window ({lo}, {hi})"
            )));
        }
        if self.max_failing_leptons > 2 {
            return Err(Error::Config(format!(
                "max_failing_leptons = {} but only 3P1F and 2P2F regions exist",
                self.max_failing_leptons
            )));
        }
        if self.subleading_pt > self.leading_pt {
            return Err(Error::Config(format!(
                "subleading pT threshold {} above leading threshold {}",
                self.subleading_pt, self.leading_pt
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub selection: SelectionConfig,
    /// Drop 2P2F quartets from events that also have a 3P1F quartet.
    pub prefer_3p1f: bool,
    /// Events between progress log lines.
    pub heartbeat: usize,
    /// Stop after this many events.
    pub max_events: Option<usize>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            selection: SelectionConfig::default(),
            prefer_3p1f: true,
            heartbeat: 10_000,
            max_events: None,
        }
    }
}

impl AnalysisConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: AnalysisConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.selection.validate()?;
        if self.heartbeat == 0 {
            return Err(Error::Config("heartbeat must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: AnalysisConfig = serde_json::from_str(
            r#"{ "prefer_3p1f": false, "selection": { "m4l_min": 100.0 } }"#,
        )
        .unwrap();
        assert!(!config.prefer_3p1f);
        assert_eq!(config.selection.m4l_min, 100.0);
        assert_eq!(config.selection.z_mass_window, (12.0, 120.0));
        assert!(config.selection.allow_z1_failing_leptons);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let parsed: std::result::Result<AnalysisConfig, _> =
            serde_json::from_str(r#"{ "prefer3p1f": false }"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = AnalysisConfig::default();
        config.selection.max_failing_leptons = 3;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
        let mut config = AnalysisConfig::default();
        config.selection.z_mass_window = (120.0, 12.0);
        assert!(config.validate().is_err());
        let mut config = AnalysisConfig::default();
        config.heartbeat = 0;
        assert!(config.validate().is_err());
    }
}
