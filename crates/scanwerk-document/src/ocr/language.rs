// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Script-based dominant-language guess for engines that report none.

use scanwerk_core::model::UNDETERMINED_LANGUAGE;

/// Languages written right to left.
const RTL_LANGUAGES: &[&str] = &["ar", "he", "fa", "ur", "yi", "ps", "sd", "ug", "dv"];

/// Whether `language` (ISO 639-1, optionally with a region suffix) is written
/// right to left.
pub fn is_rtl(language: &str) -> bool {
    let primary = language
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    RTL_LANGUAGES.contains(&primary.as_str())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Script {
    Latin,
    Arabic,
    Hebrew,
    Cyrillic,
    Greek,
    Han,
    Hangul,
    Kana,
}

fn script_of(c: char) -> Option<Script> {
    match c as u32 {
        0x41..=0x5A | 0x61..=0x7A | 0xC0..=0x24F => Some(Script::Latin),
        0x370..=0x3FF => Some(Script::Greek),
        0x400..=0x4FF => Some(Script::Cyrillic),
        0x590..=0x5FF => Some(Script::Hebrew),
        0x600..=0x6FF | 0x750..=0x77F | 0xFB50..=0xFDFF | 0xFE70..=0xFEFF => Some(Script::Arabic),
        0x3040..=0x30FF => Some(Script::Kana),
        0x4E00..=0x9FFF | 0x3400..=0x4DBF => Some(Script::Han),
        0xAC00..=0xD7AF | 0x1100..=0x11FF => Some(Script::Hangul),
        _ => None,
    }
}

/// Guess the dominant language of `text` from its letters' scripts.
///
/// Coarse by nature: Latin text is reported as `en`, Cyrillic as `ru`. Any
/// kana makes CJK text Japanese. Returns `und` when no letters are found.
pub fn detect_language(text: &str) -> String {
    let mut counts = [0usize; 8];
    let index = |s: Script| s as usize;
    for script in text.chars().filter_map(script_of) {
        counts[index(script)] += 1;
    }

    if counts[index(Script::Kana)] > 0 {
        return "ja".into();
    }
    let ranked = [
        (Script::Latin, "en"),
        (Script::Arabic, "ar"),
        (Script::Hebrew, "he"),
        (Script::Cyrillic, "ru"),
        (Script::Greek, "el"),
        (Script::Han, "zh"),
        (Script::Hangul, "ko"),
    ];
    ranked
        .iter()
        .filter(|(script, _)| counts[index(*script)] > 0)
        .max_by_key(|(script, _)| counts[index(*script)])
        .map(|(_, code)| (*code).to_owned())
        .unwrap_or_else(|| UNDETERMINED_LANGUAGE.to_owned())
}
