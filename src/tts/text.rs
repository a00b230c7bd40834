//! Подготовка текста для TTS

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref TAG: Regex = Regex::new(r"<[^>]*>").unwrap();
    // Звуковые пометки субтитров: [music], [applause]
    static ref SOUND_NOTE: Regex = Regex::new(r"\[[^\]]*\]").unwrap();
}

/// Удалить разметку, раскрыть HTML-сущности и нормализовать пробелы
pub fn prepare_text_for_tts(text: &str) -> String {
    let text = TAG.replace_all(text, " ");
    let text = SOUND_NOTE.replace_all(&text, " ");

    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&");

    text.split_whitespace().collect::<Vec<&str>>().join(" ")
}
