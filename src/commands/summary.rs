use std::io::{self, Write};

use anyhow::{Context, Result};
use selection_report::{MethodAttributes, Thresholds};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::cli::QueryArgs;
use crate::commands::load::load;

#[derive(Debug, Serialize)]
struct SummaryResponse<'a> {
    source: &'a str,
    method: &'static str,
    thresholds: Thresholds,
    attributes: MethodAttributes,
}

pub fn run(args: QueryArgs) -> Result<()> {
    let analysis = load(&args)?;
    let response = SummaryResponse {
        source: &analysis.source,
        method: analysis.method.name(),
        thresholds: analysis.thresholds,
        attributes: analysis.method.attributes(analysis.document()),
    };

    if args.json {
        let mut output = io::BufWriter::new(io::stdout().lock());
        serde_json::to_writer_pretty(&mut output, &response)
            .context("failed to serialize summary json output")?;
        writeln!(output)?;
        output.flush()?;
    } else {
        write_text_response(&response)?;
    }

    info!(method = response.method, "summary complete");
    Ok(())
}

fn write_text_response(response: &SummaryResponse<'_>) -> Result<()> {
    let attributes =
        serde_json::to_value(&response.attributes).context("failed to serialize attributes")?;
    let mut output = io::BufWriter::new(io::stdout().lock());

    writeln!(output, "Method: {}", response.method)?;
    writeln!(output, "Source: {}", response.source)?;
    writeln!(
        output,
        "Thresholds: p={} er={}",
        response.thresholds.p_value, response.thresholds.evidence_ratio
    )?;
    if let Value::Object(fields) = attributes {
        for (key, value) in fields {
            writeln!(output, "{key}\t{}", attribute_text(&value))?;
        }
    }
    output.flush()?;
    Ok(())
}

fn attribute_text(value: &Value) -> String {
    match value {
        Value::Null => "N/A".to_string(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn attribute_text_unquotes_strings_and_marks_missing() {
        assert_eq!(attribute_text(&json!("A")), "A");
        assert_eq!(attribute_text(&Value::Null), "N/A");
        assert_eq!(attribute_text(&json!([2, 2])), "[2,2]");
    }
}
