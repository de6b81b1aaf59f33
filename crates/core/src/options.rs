//! Session parameter parsing

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::collections::BTreeMap;

/// Parse raw `K V...` parameter strings into typed JSON values.
///
/// Keys follow the runtime's sampling-option schema; an unknown key or an
/// unparsable value is a validation error. Multi-valued keys (`stop`) keep
/// every value, scalar keys take the first.
pub fn format_params(params: &BTreeMap<String, Vec<String>>) -> Result<BTreeMap<String, Value>> {
    let mut out = BTreeMap::new();

    for (key, values) in params {
        if values.is_empty() {
            bail!("no value given for parameter {key:?}");
        }

        let value = match key.as_str() {
            "seed" | "num_predict" | "top_k" | "num_ctx" | "repeat_last_n" | "num_gpu" => {
                let n: i64 = values[0]
                    .parse()
                    .with_context(|| format!("invalid int value for {key:?}: {:?}", values[0]))?;
                Value::from(n)
            }
            "temperature" | "top_p" | "min_p" | "repeat_penalty" => {
                let f: f64 = values[0]
                    .parse()
                    .with_context(|| format!("invalid float value for {key:?}: {:?}", values[0]))?;
                Value::from(f)
            }
            "stop" => Value::from(values.clone()),
            _ => bail!("unknown parameter {key:?}"),
        };

        out.insert(key.clone(), value);
    }

    Ok(out)
}
