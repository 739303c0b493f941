use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use smilepnp_core::Real;
use smilepnp_linear::SqpnpOptions;
use smilepnp_optim::TinySolveOptions;

/// Levenberg–Marquardt stopping rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmConfig {
    /// Maximum LM iterations (if `None`, use the problem's default).
    pub max_iters: Option<usize>,
    pub min_abs_decrease: Option<Real>,
    pub min_rel_decrease: Option<Real>,
    pub min_error: Option<Real>,
}

impl LmConfig {
    pub fn max_iters_or(&self, default: usize) -> usize {
        self.max_iters.unwrap_or(default)
    }

    /// Tight thresholds unless overridden.
    pub fn to_solve_options(&self, default_iters: usize) -> TinySolveOptions {
        let mut opts = TinySolveOptions::precise(self.max_iters_or(default_iters));
        if self.min_abs_decrease.is_some() {
            opts.min_abs_decrease = self.min_abs_decrease;
        }
        if self.min_rel_decrease.is_some() {
            opts.min_rel_decrease = self.min_rel_decrease;
        }
        if self.min_error.is_some() {
            opts.min_error = self.min_error;
        }
        opts
    }

    fn validate(&self, name: &str) -> Result<()> {
        ensure!(self.max_iters != Some(0), "{name}.max_iters must be positive");
        for (field, value) in [
            ("min_abs_decrease", self.min_abs_decrease),
            ("min_rel_decrease", self.min_rel_decrease),
            ("min_error", self.min_error),
        ] {
            if let Some(v) = value {
                ensure!(
                    v.is_finite() && v >= 0.0,
                    "{name}.{field} must be finite and non-negative, got {v}"
                );
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Scene units in metres; replaces the scene's own scale when set.
    pub scale_override: Option<Real>,
}

/// Settings of a solver session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub sqpnp: SqpnpOptions,
    /// ITERATIVE pose stage.
    pub pose_refine: LmConfig,
    pub calibration: LmConfig,
    pub report: ReportConfig,
}

impl SolverConfig {
    pub const DEFAULT_POSE_ITERS: usize = 50;
    pub const DEFAULT_CALIBRATION_ITERS: usize = 200;

    pub fn pose_refine_options(&self) -> TinySolveOptions {
        self.pose_refine.to_solve_options(Self::DEFAULT_POSE_ITERS)
    }

    pub fn calibration_options(&self) -> TinySolveOptions {
        self.calibration
            .to_solve_options(Self::DEFAULT_CALIBRATION_ITERS)
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.sqpnp;
        ensure!(
            s.rank_tolerance > 0.0 && s.rank_tolerance.is_finite(),
            "sqpnp.rank_tolerance must be positive"
        );
        ensure!(
            s.sqp_squared_tolerance > 0.0 && s.sqp_squared_tolerance.is_finite(),
            "sqpnp.sqp_squared_tolerance must be positive"
        );
        ensure!(
            s.sqp_max_iterations > 0,
            "sqpnp.sqp_max_iterations must be positive"
        );
        self.pose_refine.validate("pose_refine")?;
        self.calibration.validate("calibration")?;
        if let Some(scale) = self.report.scale_override {
            ensure!(scale.is_finite(), "report.scale_override must be finite");
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        SolverConfig::default().validate().unwrap();
        let opts = SolverConfig::default().calibration_options();
        assert_eq!(opts.max_iters, SolverConfig::DEFAULT_CALIBRATION_ITERS);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            SolverConfig::from_json(r#"{ "pose_refine": { "max_iters": 10 } }"#).unwrap();
        assert_eq!(config.pose_refine_options().max_iters, 10);
        assert_eq!(config.sqpnp, SqpnpOptions::default());
        assert_eq!(config.calibration, LmConfig::default());
    }

    #[test]
    fn overrides_replace_thresholds() {
        let lm = LmConfig {
            min_rel_decrease: Some(1e-6),
            ..LmConfig::default()
        };
        let opts = lm.to_solve_options(30);
        assert_eq!(opts.max_iters, 30);
        assert_eq!(opts.min_rel_decrease, Some(1e-6));
        assert_eq!(opts.min_abs_decrease, Some(1e-14));
    }

    #[test]
    fn rejects_zero_iterations() {
        let err = SolverConfig::from_json(r#"{ "calibration": { "max_iters": 0 } }"#).unwrap_err();
        assert!(err.to_string().contains("calibration.max_iters"));
    }

    #[test]
    fn rejects_non_positive_rank_tolerance() {
        let mut config = SolverConfig::default();
        config.sqpnp.rank_tolerance = 0.0;
        assert!(config.validate().is_err());
    }
}
