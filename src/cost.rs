//! Cost accounting in BRL.
//!
//! Pure per-model rate lookup, no side effects. Rates are USD list prices
//! converted at a fixed factor; unknown models price at zero rather than
//! erroring so accounting never blocks a pipeline.

/// Fixed USD to BRL conversion factor used for accounting.
const USD_TO_BRL: f64 = 6.0;

/// Speech-to-text charge per minute of audio (Whisper list price).
///
/// Applied whenever a duration is reported, independent of the text model,
/// since a speech charge can accompany a chat-completion charge. This is a
/// deliberate simplification, not a multi-line-item bill.
const SPEECH_PER_MINUTE_USD: f64 = 0.006;

/// Per-token rates for one model, in BRL.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelRates {
    pub input_per_token: f64,
    pub output_per_token: f64,
}

impl ModelRates {
    const ZERO: ModelRates = ModelRates {
        input_per_token: 0.0,
        output_per_token: 0.0,
    };

    const fn per_million_usd(input: f64, output: f64) -> Self {
        Self {
            input_per_token: input / 1_000_000.0 * USD_TO_BRL,
            output_per_token: output / 1_000_000.0 * USD_TO_BRL,
        }
    }
}

/// Look up the token rates for a model. Unknown models price at zero.
pub fn rates_for(model: &str) -> ModelRates {
    match model {
        "gpt-4o-2024-08-06" => ModelRates::per_million_usd(2.50, 10.00),
        "gpt-5-mini" => ModelRates::per_million_usd(0.15, 0.60),
        "gemini-2.5-flash" => ModelRates::per_million_usd(0.075, 0.30),
        _ => ModelRates::ZERO,
    }
}

/// Compute the BRL cost of one processing run.
///
/// Total = input tokens x input rate + output tokens x output rate +
/// (duration / 60) x speech per-minute rate.
pub fn cost_brl(model: &str, input_tokens: u32, output_tokens: u32, duration_seconds: f64) -> f64 {
    let rates = rates_for(model);
    let text_cost = input_tokens as f64 * rates.input_per_token
        + output_tokens as f64 * rates.output_per_token;

    let audio_cost = (duration_seconds / 60.0) * SPEECH_PER_MINUTE_USD * USD_TO_BRL;

    text_cost + audio_cost
}

#[cfg(test)]
mod tests {
    use super::*;

    const KNOWN_MODELS: [&str; 3] = ["gpt-4o-2024-08-06", "gpt-5-mini", "gemini-2.5-flash"];

    #[test]
    fn test_zero_inputs_cost_nothing() {
        for model in KNOWN_MODELS {
            assert_eq!(cost_brl(model, 0, 0, 0.0), 0.0);
        }
        assert_eq!(cost_brl("some-unknown-model", 0, 0, 0.0), 0.0);
    }

    #[test]
    fn test_million_input_tokens_equals_input_rate() {
        // 1M input tokens at $0.15/1M converted at 6.0.
        let cost = cost_brl("gpt-5-mini", 1_000_000, 0, 0.0);
        assert!((cost - 0.15 * 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_pure_function_idempotent() {
        let first = cost_brl("gemini-2.5-flash", 1234, 567, 90.0);
        let second = cost_brl("gemini-2.5-flash", 1234, 567, 90.0);
        assert_eq!(first, second);
    }

    #[test]
    fn test_unknown_model_zero_token_rates() {
        assert_eq!(rates_for("modelX"), ModelRates::ZERO);
        assert_eq!(cost_brl("modelX", 5_000_000, 5_000_000, 0.0), 0.0);
    }

    #[test]
    fn test_duration_adds_speech_charge_for_any_model() {
        // One minute of audio bills the speech rate even on a zero-rate model.
        let cost = cost_brl("modelX", 0, 0, 60.0);
        assert!((cost - 0.006 * 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_speech_and_text_charges_combine() {
        let text_only = cost_brl("gpt-5-mini", 100, 50, 0.0);
        let with_audio = cost_brl("gpt-5-mini", 100, 50, 20.0);
        assert!(with_audio > text_only);
        assert!(text_only > 0.0);
    }
}
