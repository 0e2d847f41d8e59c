//! Delivery hints prepended to the synthesis input.
//!
//! The speech model reads an accent sentence and a tone sentence before the
//! caller's text. Both come from fixed tables; unknown accents and tones
//! contribute nothing.

use crate::store::VoiceProfile;

pub const DEFAULT_TONE: &str = "neutral";

/// Accent sentence for a voice, chosen from its accent key and description
pub fn accent_instruction(accent: &str, description: &str) -> &'static str {
    match accent.trim().to_ascii_lowercase().as_str() {
        "nigerian" => {
            let description = description.to_lowercase();
            // "female" contains "male", so it has to be tested first
            if description.contains("female") {
                "Read as a NIGERIAN FEMALE voice with authentic Naija English cadence. "
            } else if description.contains("male") {
                "Read as a NIGERIAN MALE voice with authentic Naija English cadence. "
            } else {
                "Read with authentic NIGERIAN English accent and cadence. "
            }
        }
        "american" => "Read with clear AMERICAN English pronunciation. ",
        _ => "",
    }
}

pub fn tone_instruction(tone: &str) -> &'static str {
    match tone.trim().to_ascii_lowercase().as_str() {
        "friendly" => "Make it warm, welcoming and friendly. Add light Pidgin where natural. ",
        "bold" => "Deliver with confidence and presence. ",
        "calm" => "Keep it calm and steady. ",
        "sales" => "Persuasive and upbeat for marketing. ",
        "support" => "Empathetic and reassuring. ",
        "ads" => "Catchy and punchy for short ads. ",
        _ => "",
    }
}

/// `accent + tone + text`, trimmed
pub fn enhance_text(text: &str, voice: &VoiceProfile, tone: &str) -> String {
    let mut out = String::with_capacity(text.len() + 128);
    out.push_str(accent_instruction(&voice.accent, &voice.description));
    out.push_str(tone_instruction(tone));
    out.push_str(text);
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Visibility;
    use time::OffsetDateTime;

    fn voice(accent: &str, description: &str) -> VoiceProfile {
        VoiceProfile {
            id: "v".to_string(),
            owner_id: "system".to_string(),
            display_name: "V".to_string(),
            provider_voice_name: "coral".to_string(),
            description: description.to_string(),
            language: "en-NG".to_string(),
            accent: accent.to_string(),
            visibility: Visibility::Public,
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn test_female_description_wins_over_male_substring() {
        let hint = accent_instruction("nigerian", "Nigerian Female, warm & lively");
        assert!(hint.contains("NIGERIAN FEMALE"));
        let hint = accent_instruction("nigerian", "Nigerian male, deep & calm");
        assert!(hint.contains("NIGERIAN MALE"));
        let hint = accent_instruction("nigerian", "");
        assert_eq!(hint, "Read with authentic NIGERIAN English accent and cadence. ");
    }

    #[test]
    fn test_unknown_accent_and_tone_add_nothing() {
        let enhanced = enhance_text("  Hello there  ", &voice("british", ""), "whisper");
        assert_eq!(enhanced, "Hello there");
    }

    #[test]
    fn test_neutral_tone_is_empty() {
        assert_eq!(tone_instruction(DEFAULT_TONE), "");
    }

    #[test]
    fn test_enhance_concatenation_order() {
        let enhanced = enhance_text("Buy now", &voice("american", "US male"), "ads");
        assert_eq!(
            enhanced,
            "Read with clear AMERICAN English pronunciation. Catchy and punchy for short ads. Buy now"
        );
    }
}
