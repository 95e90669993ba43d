use crate::{error::StrategyError, strategy::Strategy};
use folio_instrument::{Security, directory};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;
use std::sync::Arc;

/// Raw JSON argument map, as received on the wire.
pub type ArgumentMap = serde_json::Map<String, Value>;

/// Constructs a strategy instance from raw arguments, validating them.
pub type StrategyFactory = fn(&ArgumentMap) -> Result<Box<dyn Strategy>, StrategyError>;

/// Wire typecode of a strategy argument.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub enum ArgumentType {
    #[serde(rename = "string")]
    String,
    #[serde(rename = "choice")]
    Choice,
    #[serde(rename = "number")]
    Number,
    #[serde(rename = "[]security")]
    Securities,
    #[serde(rename = "[]string")]
    Strings,
}

/// Schema of one strategy argument.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Argument {
    pub typecode: ArgumentType,
    /// Raw JSON default applied when the argument is omitted.
    pub default: Value,
    pub help: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

/// Declarative description of a strategy: identity, argument schema,
/// suggested parameter bundles, benchmark and factory.
#[derive(Debug, Clone)]
pub struct StrategyInfo {
    pub shortcode: SmolStr,
    pub name: String,
    pub long_description: String,
    pub version: SmolStr,
    pub benchmark: Security,
    pub arguments: IndexMap<SmolStr, Argument>,
    pub suggested_parameters: IndexMap<SmolStr, IndexMap<SmolStr, Value>>,
    pub factory: StrategyFactory,
}

impl StrategyInfo {
    /// Construct a strategy instance, filling omitted arguments with their
    /// schema defaults before invoking the factory.
    pub fn build(&self, arguments: &ArgumentMap) -> Result<Box<dyn Strategy>, StrategyError> {
        let mut merged = arguments.clone();
        for (key, argument) in &self.arguments {
            merged
                .entry(key.to_string())
                .or_insert_with(|| argument.default.clone());
        }
        for key in arguments.keys() {
            if !self.arguments.contains_key(key.as_str()) {
                return Err(StrategyError::InvalidArguments(format!(
                    "unknown argument: {key}"
                )));
            }
        }
        (self.factory)(&merged)
    }
}

/// Parse a `[]security` argument, resolving entries through the process
/// directory.
pub fn parse_securities(
    arguments: &ArgumentMap,
    key: &str,
) -> Result<Vec<Arc<Security>>, StrategyError> {
    let value = required(arguments, key)?;
    let securities: Vec<Security> = serde_json::from_value(value.clone())
        .map_err(|err| StrategyError::InvalidArguments(format!("{key}: {err}")))?;
    Ok(securities
        .into_iter()
        .map(|security| directory().insert(security))
        .collect())
}

/// Parse a single `security` argument.
pub fn parse_security(
    arguments: &ArgumentMap,
    key: &str,
) -> Result<Arc<Security>, StrategyError> {
    let value = required(arguments, key)?;
    let security: Security = serde_json::from_value(value.clone())
        .map_err(|err| StrategyError::InvalidArguments(format!("{key}: {err}")))?;
    Ok(directory().insert(security))
}

/// Parse a `number` argument.
pub fn parse_number(arguments: &ArgumentMap, key: &str) -> Result<f64, StrategyError> {
    required(arguments, key)?
        .as_f64()
        .ok_or_else(|| StrategyError::InvalidArguments(format!("{key}: expected a number")))
}

/// Parse a `string` or `choice` argument.
pub fn parse_string(arguments: &ArgumentMap, key: &str) -> Result<String, StrategyError> {
    required(arguments, key)?
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| StrategyError::InvalidArguments(format!("{key}: expected a string")))
}

/// Resolve a ticker through the process directory. Unknown tickers surface
/// the data-layer `SecurityNotFound` taxonomy entry.
pub fn resolve_ticker(ticker: &str) -> Result<Arc<Security>, StrategyError> {
    directory().by_ticker(ticker).ok_or_else(|| {
        StrategyError::Data(folio_data::DataError::SecurityNotFound(SmolStr::new(
            ticker,
        )))
    })
}

fn required<'a>(arguments: &'a ArgumentMap, key: &str) -> Result<&'a Value, StrategyError> {
    arguments
        .get(key)
        .ok_or_else(|| StrategyError::InvalidArguments(format!("missing argument: {key}")))
}

/// JSON shape of a security-valued argument.
pub fn security_value(ticker: &str, composite_figi: &str) -> Value {
    serde_json::json!({ "ticker": ticker, "compositeFigi": composite_figi })
}
