use crate::app::command_support::{map_dashboard_err, CommandContext};

pub fn cmd_ai(args: &[String]) -> Result<String, String> {
    let desired = match args {
        [] => None,
        [value] => Some(parse_toggle(value)?),
        _ => return Err("usage: ai [on|off]".to_string()),
    };
    let context = CommandContext::load()?;
    let mut client = context.signed_in_client()?;
    let enabled = match desired {
        None => client.fetch_settings().map_err(map_dashboard_err)?,
        Some(enabled) => client
            .set_global_ai_enabled(enabled)
            .map_err(map_dashboard_err)?,
    };
    Ok(format!("ai_enabled={enabled}"))
}

fn parse_toggle(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "1" | "enable" => Ok(true),
        "off" | "false" | "0" | "disable" => Ok(false),
        other => Err(format!("invalid ai value `{other}`; usage: ai [on|off]")),
    }
}

#[cfg(test)]
mod tests {
    use super::parse_toggle;

    #[test]
    fn toggle_accepts_common_spellings() {
        assert_eq!(parse_toggle("ON"), Ok(true));
        assert_eq!(parse_toggle("0"), Ok(false));
        assert!(parse_toggle("maybe").is_err());
    }
}
