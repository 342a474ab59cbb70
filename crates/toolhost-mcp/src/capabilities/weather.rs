//! Weather capabilities over a pluggable [`WeatherSource`].
//!
//! The host never talks to a weather service itself; whoever builds the
//! registry supplies the source. The analysis prompt needs no data and is
//! always available.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use toolhost::{
    handler_fn, Arguments, CapabilityDescriptor, CapabilityRegistry, HostResult, ParamSpec,
    ParamType,
};

pub const MAX_FORECAST_DAYS: i64 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeather {
    pub location: String,
    pub temperature: String,
    pub condition: String,
    pub humidity: String,
    pub wind: String,
    pub feels_like: String,
}

impl CurrentWeather {
    /// Plain-text report served by the `weather://` resource.
    pub fn report(&self) -> String {
        format!(
            "Weather Report for {}\n\n\
             Current Conditions:\n\
             - Temperature: {} (feels like {})\n\
             - Condition: {}\n\
             - Humidity: {}\n\
             - Wind Speed: {}\n",
            self.location, self.temperature, self.feels_like, self.condition, self.humidity, self.wind
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastDay {
    pub date: String,
    pub max_temp: String,
    pub min_temp: String,
    pub condition: String,
    pub chance_of_rain: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub location: String,
    pub forecast: Vec<ForecastDay>,
}

/// Where weather data comes from.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn current(&self, location: &str) -> anyhow::Result<CurrentWeather>;

    /// At most `days` entries, starting today.
    async fn forecast(&self, location: &str, days: u32) -> anyhow::Result<Forecast>;
}

/// Analysis focus for the `weather_analysis` prompt; unknown names fall
/// back to `general`.
fn analysis_focus(context: &str) -> &'static str {
    match context {
        "travel" => "analyze the weather conditions for travel planning",
        "outdoor" => "analyze the weather for outdoor activities",
        "clothing" => "suggest appropriate clothing based on weather",
        _ => "provide a general weather analysis",
    }
}

pub fn analysis_prompt(location: &str, context: &str) -> String {
    format!(
        "Based on the current weather data for {location}, please {}.\n\
         Consider temperature, humidity, wind conditions, and any weather advisories.\n\
         Provide practical advice and recommendations.",
        analysis_focus(context)
    )
}

fn forecast_days(args: &Arguments) -> anyhow::Result<u32> {
    let days = args.i64("days")?;
    if days < 1 {
        anyhow::bail!("days must be at least 1, got {days}");
    }
    Ok(days.min(MAX_FORECAST_DAYS) as u32)
}

/// Register the prompt, plus the tools and resource when a source is given.
pub fn register(
    registry: &mut CapabilityRegistry,
    source: Option<Arc<dyn WeatherSource>>,
) -> HostResult<()> {
    let prompt = CapabilityDescriptor::prompt("weather_analysis")
        .description("Generate a weather analysis prompt")
        .param(ParamSpec::required("location", ParamType::String))
        .param(
            ParamSpec::optional("context", ParamType::String)
                .with_default(json!("general"))
                .describe("travel, outdoor, clothing, or general"),
        )
        .build()?;
    registry.register(
        prompt,
        handler_fn(|args: Arguments| async move {
            let location = args.str("location")?;
            let context = args.opt_str("context").unwrap_or("general");
            Ok(Value::String(analysis_prompt(location, context)))
        }),
    )?;

    let Some(source) = source else {
        tracing::debug!("No weather source configured; weather tools not registered");
        return Ok(());
    };

    let current = CapabilityDescriptor::tool("get_weather")
        .description("Get current weather for any location")
        .required("location", ParamType::String)
        .build()?;
    let src = source.clone();
    registry.register(
        current,
        handler_fn(move |args: Arguments| {
            let src = src.clone();
            async move {
                let weather = src.current(args.str("location")?).await?;
                Ok(serde_json::to_value(weather)?)
            }
        }),
    )?;

    let forecast = CapabilityDescriptor::tool("get_forecast")
        .description("Get weather forecast for a location (up to 3 days)")
        .required("location", ParamType::String)
        .with_default("days", ParamType::Integer, json!(MAX_FORECAST_DAYS))
        .build()?;
    let src = source.clone();
    registry.register(
        forecast,
        handler_fn(move |args: Arguments| {
            let src = src.clone();
            async move {
                let days = forecast_days(&args)?;
                let forecast = src.forecast(args.str("location")?, days).await?;
                Ok(serde_json::to_value(forecast)?)
            }
        }),
    )?;

    let resource = CapabilityDescriptor::resource("weather", "weather://{location}")
        .description("Current conditions as a plain-text report")
        .mime_type("text/plain")
        .build()?;
    registry.register(
        resource,
        handler_fn(move |args: Arguments| {
            let src = source.clone();
            async move {
                let weather = src.current(args.str("location")?).await?;
                Ok(Value::String(weather.report()))
            }
        }),
    )?;

    Ok(())
}
