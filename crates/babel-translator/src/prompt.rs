//! Literary translation prompt.

use babel_local::coordinator::language_name;

pub const DEFAULT_SOURCE_LANG: &str = "ru";
pub const DEFAULT_TARGET_LANG: &str = "sr";
pub const DEFAULT_CONTEXT: &str = "Literary text";

fn is_serbian(code: &str) -> bool {
    matches!(code, "sr" | "sr-cyrl" | "sr-latn")
}

/// Build the prompt for translating `text` from `from` to `to`.
///
/// Serbian targets get script and dialect rules on top of the general
/// literary guidelines.
pub fn translation_prompt(text: &str, context: &str, from: &str, to: &str) -> String {
    let from_name = language_name(from);
    let to_name = language_name(to);
    let context = if context.trim().is_empty() {
        DEFAULT_CONTEXT
    } else {
        context
    };

    let mut prompt = format!(
        "You are a professional literary translator specializing in {from_name} to {to_name} translation.\n\
         Your task is to translate the following {from_name} text into natural, idiomatic {to_name}.\n\
         \n\
         Guidelines:\n\
         1. Preserve the literary style and tone\n\
         2. Use appropriate {to_name} vocabulary and grammar\n\
         3. Maintain cultural nuances and idioms\n\
         4. Keep names of people and places unchanged unless they have standard {to_name} equivalents\n\
         5. Preserve formatting, punctuation, and paragraph structure\n"
    );

    let mut answer_label = format!("{to_name} translation:");
    if is_serbian(to) {
        if to == "sr-latn" {
            prompt.push_str("6. Use Serbian Latin script (latinica)\n");
        } else {
            prompt.push_str("6. Use Serbian Cyrillic script (ћирилица)\n");
        }
        prompt.push_str(
            "7. **CRITICAL**: Use ONLY Ekavica dialect (екавица) - the standard Serbian dialect used in Serbia\n   \
             - Use \"е\" instead of \"ије/је\": mleko (not mlijeko), dete (not dijete), pesma (not pjesma)\n   \
             - Ekavica examples: hteo (not htio), lepo (not lijepo), reka (not rijeka)\n   \
             - This is MANDATORY for all translations to Serbian\n\
             8. **CRITICAL**: Use ONLY pure Serbian vocabulary - avoid Croatian, Bosnian, or Montenegrin words\n   \
             - Use standard Serbian words preferred in Serbia, not regional variants\n   \
             - Example: use \"avion\" (not Croatian \"zrakoplov\"), \"pozorište\" (not Croatian \"kazalište\")\n",
        );
        answer_label = "Serbian translation (Ekavica only):".to_string();
    }

    prompt.push_str(&format!(
        "\nContext: {context}\n\n{from_name} text:\n{text}\n\n{answer_label}"
    ));
    prompt
}
