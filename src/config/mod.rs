use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub columns: ColumnConfig,
    #[serde(default)]
    pub loader: LoaderConfig,
    #[serde(default)]
    pub normalizer: NormalizerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

/// Prioritised column aliases. The first alias present in the header wins.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ColumnConfig {
    #[serde(default = "default_date_aliases")]
    pub date: Vec<String>,

    #[serde(default = "default_amount_aliases")]
    pub amount: Vec<String>,

    #[serde(default = "default_quantity_aliases")]
    pub quantity: Vec<String>,

    #[serde(default = "default_cost_aliases")]
    pub cost: Vec<String>,

    #[serde(default)]
    pub missing_optional: MissingColumnPolicy,
}

/// What to do when both quantity and cost columns are absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingColumnPolicy {
    /// Warn and continue with sales-only data.
    #[default]
    Degrade,
    /// Fail the request with a schema error.
    Reject,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoaderConfig {
    /// chrono format strings, tried in order.
    #[serde(default = "default_date_formats")]
    pub date_formats: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NormalizerConfig {
    /// Spans longer than this are resampled to monthly totals.
    #[serde(default = "default_monthly_threshold_days")]
    pub monthly_threshold_days: i64,
}

/// Structural orders of the seasonal model plus estimation knobs.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModelConfig {
    #[serde(default = "default_order")]
    pub order: ArimaOrder,

    #[serde(default = "default_seasonal_order")]
    pub seasonal: SeasonalOrder,

    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,

    #[serde(default = "default_max_iter")]
    pub max_iter: usize,

    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

/// Non-seasonal (p, d, q).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ArimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
}

/// Seasonal (P, D, Q) with period s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct SeasonalOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
    pub period: usize,
}

/// Chart cosmetics handed to the presentation layer.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DisplayConfig {
    #[serde(default = "default_title")]
    pub title: String,

    #[serde(default = "default_x_title")]
    pub x_title: String,

    #[serde(default = "default_y_title")]
    pub y_title: String,

    #[serde(default = "default_historical_name")]
    pub historical_name: String,

    #[serde(default = "default_forecast_name")]
    pub forecast_name: String,

    #[serde(default = "default_historical_color")]
    pub historical_color: String,

    #[serde(default = "default_forecast_color")]
    pub forecast_color: String,

    /// Overrides the cadence-derived tick format when set.
    #[serde(default)]
    pub tick_format: Option<String>,

    /// Label every n-th period on the time axis.
    #[serde(default = "default_tick_interval")]
    pub tick_interval: usize,

    #[serde(default = "default_true")]
    pub range_slider: bool,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn aliases(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn default_date_aliases() -> Vec<String> {
    aliases(&["Date", "date", "Order Date"])
}
fn default_amount_aliases() -> Vec<String> {
    aliases(&["Amount", "Sales", "sale", "cost"])
}
fn default_quantity_aliases() -> Vec<String> {
    aliases(&["Qty", "Quantity", "quantity"])
}
fn default_cost_aliases() -> Vec<String> {
    aliases(&["Cost", "Unit Cost", "Price"])
}
fn default_date_formats() -> Vec<String> {
    aliases(&["%m/%d/%Y", "%d-%m-%Y"])
}
fn default_monthly_threshold_days() -> i64 {
    365
}
fn default_order() -> ArimaOrder {
    ArimaOrder { p: 2, d: 1, q: 2 }
}
fn default_seasonal_order() -> SeasonalOrder {
    SeasonalOrder { p: 1, d: 1, q: 1, period: 12 }
}
fn default_confidence_level() -> f64 {
    0.95
}
fn default_max_iter() -> usize {
    10_000
}
fn default_tolerance() -> f64 {
    1e-8
}
fn default_title() -> String {
    "Sales Over Time".to_string()
}
fn default_x_title() -> String {
    "Date".to_string()
}
fn default_y_title() -> String {
    "Sales".to_string()
}
fn default_historical_name() -> String {
    "Historical Sales".to_string()
}
fn default_forecast_name() -> String {
    "Forecasted Sales".to_string()
}
fn default_historical_color() -> String {
    "blue".to_string()
}
fn default_forecast_color() -> String {
    "red".to_string()
}
fn default_tick_interval() -> usize {
    3
}
fn default_true() -> bool {
    true
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            date: default_date_aliases(),
            amount: default_amount_aliases(),
            quantity: default_quantity_aliases(),
            cost: default_cost_aliases(),
            missing_optional: MissingColumnPolicy::default(),
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            date_formats: default_date_formats(),
        }
    }
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            monthly_threshold_days: default_monthly_threshold_days(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            order: default_order(),
            seasonal: default_seasonal_order(),
            confidence_level: default_confidence_level(),
            max_iter: default_max_iter(),
            tolerance: default_tolerance(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            x_title: default_x_title(),
            y_title: default_y_title(),
            historical_name: default_historical_name(),
            forecast_name: default_forecast_name(),
            historical_color: default_historical_color(),
            forecast_color: default_forecast_color(),
            tick_format: None,
            tick_interval: default_tick_interval(),
            range_slider: true,
        }
    }
}

impl ModelConfig {
    /// Number of free coefficients estimated by the optimizer.
    pub fn num_params(&self) -> usize {
        self.order.p + self.order.q + self.seasonal.p + self.seasonal.q
    }

    /// Fewest observations a fit is attempted on.
    pub fn min_observations(&self) -> usize {
        self.order.d
            + self.seasonal.d * self.seasonal.period
            + self.order.p.max(self.order.q)
            + 2
    }

    /// Below this many observations the seasonal estimates are unreliable.
    pub fn reliable_observations(&self) -> usize {
        if self.is_seasonal() {
            2 * self.seasonal.period + 1
        } else {
            self.min_observations()
        }
    }

    pub fn is_seasonal(&self) -> bool {
        self.seasonal.period > 1
            && (self.seasonal.p + self.seasonal.d + self.seasonal.q) > 0
    }

    /// The same model with the seasonal part switched off.
    pub fn non_seasonal(order: ArimaOrder) -> Self {
        Self {
            order,
            seasonal: SeasonalOrder { p: 0, d: 0, q: 0, period: 0 },
            ..Self::default()
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::Environment::with_prefix("SALES")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app_cfg: AppConfig = cfg.try_deserialize()?;
        Ok(app_cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_fixed_model() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.model.order, ArimaOrder { p: 2, d: 1, q: 2 });
        assert_eq!(
            cfg.model.seasonal,
            SeasonalOrder { p: 1, d: 1, q: 1, period: 12 }
        );
        assert_eq!(cfg.model.num_params(), 6);
        assert_eq!(cfg.model.min_observations(), 17);
        assert_eq!(cfg.model.reliable_observations(), 25);
        assert_eq!(cfg.loader.date_formats, vec!["%m/%d/%Y", "%d-%m-%Y"]);
        assert_eq!(cfg.columns.missing_optional, MissingColumnPolicy::Degrade);
    }

    #[test]
    fn non_seasonal_thresholds() {
        let model = ModelConfig::non_seasonal(ArimaOrder { p: 1, d: 1, q: 1 });
        assert!(!model.is_seasonal());
        assert_eq!(model.min_observations(), 4);
        assert_eq!(model.reliable_observations(), 4);
    }

    #[test]
    fn partial_sections_fill_defaults() {
        let cfg = config::Config::builder()
            .add_source(config::File::from_str(
                "[model]\nconfidence_level = 0.8\n[columns]\nmissing_optional = \"reject\"\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let app: AppConfig = cfg.try_deserialize().unwrap();
        assert_eq!(app.model.confidence_level, 0.8);
        assert_eq!(app.model.order.p, 2);
        assert_eq!(app.columns.missing_optional, MissingColumnPolicy::Reject);
        assert_eq!(app.columns.date[0], "Date");
        assert_eq!(app.display.tick_interval, 3);
    }
}
