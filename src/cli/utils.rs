use std::io::{self, BufRead, Read, Write};

use serde_json::{json, Value};

use crate::cli::OutputFormat;

/// Output a success message in the appropriate format
pub fn output_success(
    output_format: &OutputFormat,
    message: &str,
    data: Option<Value>,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });

            if let (Some(Value::Object(extra)), Some(target)) = (data, response.as_object_mut()) {
                target.extend(extra);
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// Output an error message in the appropriate format
pub fn output_error(
    output_format: &OutputFormat,
    message: &str,
    error_code: Option<&str>,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": false,
                "error": message
            });

            if let Some(code) = error_code {
                response["error_code"] = json!(code);
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            eprintln!("Error: {}", message);
        }
    }
    Ok(())
}

/// Print a backend payload: pretty JSON in both formats, bare strings unquoted in text mode.
pub fn output_value(output_format: &OutputFormat, value: &Value) -> anyhow::Result<()> {
    match (output_format, value) {
        (OutputFormat::Text, Value::String(s)) => println!("{}", s),
        (OutputFormat::Text, Value::Null) => println!("(empty response)"),
        _ => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

/// Print labelled fields in text mode, or the whole object in JSON mode.
pub fn output_fields(
    output_format: &OutputFormat,
    key: &str,
    fields: &[(&str, String)],
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let object: serde_json::Map<String, Value> = fields
                .iter()
                .map(|(label, value)| (label.to_string(), json!(value)))
                .collect();
            println!("{}", serde_json::to_string_pretty(&json!({ key: object }))?);
        }
        OutputFormat::Text => {
            let width = fields.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
            for (label, value) in fields {
                println!("{:width$}  {}", label, value, width = width);
            }
        }
    }
    Ok(())
}

/// Read a JSON document from stdin for create/update commands.
pub fn read_stdin_json() -> anyhow::Result<Value> {
    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;

    if input.trim().is_empty() {
        return Err(anyhow::anyhow!("Expected a JSON body on stdin"));
    }

    serde_json::from_str(&input).map_err(|e| anyhow::anyhow!("Invalid JSON on stdin: {}", e))
}

/// Ask for a password on the terminal. Input is read as a plain line.
pub fn prompt_password() -> anyhow::Result<String> {
    eprint!("Password: ");
    io::stderr().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();

    if password.is_empty() {
        return Err(anyhow::anyhow!("Password is required"));
    }
    Ok(password)
}
