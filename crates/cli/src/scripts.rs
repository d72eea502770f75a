//! Script functions shipped with the binary.

use agentkit_tools::ScriptRegistry;

/// `calc_interest(principal, rate_percent)`: simple interest, two decimals.
fn calc_interest(args: &[String]) -> anyhow::Result<String> {
    let [principal, rate] = args else {
        anyhow::bail!("expected 2 arguments (principal, rate), got {}", args.len());
    };
    let principal: f64 = principal.parse()?;
    let rate: f64 = rate.parse()?;
    Ok(format!("interest={:.2}", principal * rate / 100.0))
}

pub fn builtin() -> ScriptRegistry {
    ScriptRegistry::new().with("calc_interest", calc_interest)
}
