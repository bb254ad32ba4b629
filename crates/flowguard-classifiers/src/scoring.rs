//! Risk score and severity tier derivation

use flowguard_core::{Error, Result, Severity};

/// Lower bound of each tier above Low, on the 0-100 risk scale
const MEDIUM_FROM: f64 = 30.0;
const HIGH_FROM: f64 = 60.0;
const CRITICAL_FROM: f64 = 80.0;

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Risk score in [0, 100] from an attack probability in [0, 1]
pub fn risk_score(probability: f64) -> Result<f64> {
    if !(0.0..=1.0).contains(&probability) {
        return Err(Error::InvalidScore(probability));
    }
    Ok(round2(probability * 100.0))
}

/// Severity tier for a risk score; tiers are closed on their lower bound
pub fn severity(risk_score: f64) -> Result<Severity> {
    if !(0.0..=100.0).contains(&risk_score) {
        return Err(Error::InvalidScore(risk_score));
    }

    let tier = if risk_score < MEDIUM_FROM {
        Severity::Low
    } else if risk_score < HIGH_FROM {
        Severity::Medium
    } else if risk_score < CRITICAL_FROM {
        Severity::High
    } else {
        Severity::Critical
    };
    Ok(tier)
}

/// Risk score and severity for an attack probability
///
/// Severity is derived from the rounded risk score, so the logged score and
/// tier always agree.
pub fn score(probability: f64) -> Result<(f64, Severity)> {
    let risk = risk_score(probability)?;
    Ok((risk, severity(risk)?))
}

/// Human-readable description of an attack category
pub fn describe_attack(category: &str) -> &'static str {
    match category {
        "DoS" => "Denial of Service: traffic flooding attempt",
        "Fuzzers" => "Malformed packet attack",
        "Exploits" => "System vulnerability exploitation attempt",
        "Reconnaissance" => "Network scanning / probing",
        "Generic" => "Brute force / general intrusion",
        "Shellcode" => "Code injection attempt",
        "Worms" => "Self-propagating malware activity",
        "Backdoor" => "Covert remote access channel",
        "Analysis" => "Port scan, spam or HTML-file penetration activity",
        _ => "Unknown threat pattern",
    }
}
