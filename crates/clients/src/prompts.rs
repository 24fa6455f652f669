//! Instruction text sent to the language model.

use stampline_core::generation::ImagePromptRequest;
use stampline_core::genre::Genre;

/// Number of character directions requested per call.
pub const PROPOSAL_COUNT: usize = 3;

fn genre_brief(genre: Genre) -> &'static str {
    match genre {
        Genre::Animal => "an animal character",
        Genre::OriginalCharacter => {
            "an original character (for example a tipsy middle-aged man or a sleepy office worker)"
        }
        Genre::Concept => {
            "a concept set with no fixed character: objects or abstract ideas. Examples: \
             vegetables expressing emotions, a mysterious white blob insisting on things, \
             food making small talk, geometric shapes with feelings, weather acting like characters"
        }
        Genre::AiFree => "anything you like; the theme is entirely up to you",
    }
}

fn with_hint(prompt: String, label: &str, hint: Option<&str>) -> String {
    match hint.map(str::trim).filter(|h| !h.is_empty()) {
        Some(h) => format!("{label}: {h}\n\n{prompt}"),
        None => prompt,
    }
}

/// Prompt asking for character directions.
pub fn proposals(genre: Genre, hint: Option<&str>) -> String {
    let prompt = format!(
        "Propose characters for a LINE sticker set.\n\
         Type: {brief}\n\
         Give {PROPOSAL_COUNT} unique, friendly proposals as a JSON array in this shape:\n\
         [\n  {{\n    \"name\": \"character name\",\n    \"genre\": \"{genre}\",\n    \
         \"description\": \"appearance, personality and traits in detail\",\n    \
         \"sd_base_prompt\": \"English Stable Diffusion prompt fixing style and appearance\",\n    \
         \"character_consistency\": {consistency}\n  }}\n]\n\
         Output JSON only.",
        brief = genre_brief(genre),
        consistency = genre.requires_consistency(),
    );
    with_hint(prompt, "User request", hint)
}

/// Prompt asking for `count` sticker phrases.
pub fn phrases(character_description: &str, count: usize, hint: Option<&str>) -> String {
    let prompt = format!(
        "Propose {count} Japanese phrases for LINE stickers featuring this character.\n\
         Character: {character_description}\n\n\
         Balance greetings, replies, emotions, everyday chat and small jokes.\n\
         Output a JSON array of strings only, e.g. [\"おはよう！\", \"ありがとう\", \"了解です\"]."
    );
    with_hint(prompt, "User request", hint)
}

/// Prompt asking for one detailed image prompt.
pub fn image_prompt(request: &ImagePromptRequest<'_>) -> String {
    let prompt = format!(
        "Write a detailed English Stable Diffusion prompt from the following.\n\n\
         Character: {description}\n\
         Base prompt: {base}\n\
         Phrase: {phrase}\n\n\
         Include the character's appearance and outfit, an expression and pose that fit the \
         phrase, a sticker-friendly style (cute, simple, no background) and quality tags \
         (high quality, clean lines, transparent background).\n\
         Output the prompt only.",
        description = request.character_description,
        base = request.base_prompt,
        phrase = request.phrase,
    );
    with_hint(prompt, "Requested change", request.modification)
}
