//! Country codes and the Dutch display names used on invoice lines
//!
//! Toll operators report countries as free text in several languages; invoice
//! lines always show the Dutch name. Lookup is diacritic-insensitive, so
//! "belgie", "België" and "Belgium" all resolve to `BE`.

/// (code, Dutch display name, accepted free-text spellings after folding)
const COUNTRIES: &[(&str, &str, &[&str])] = &[
    ("BE", "België", &["belgie", "belgium", "belgien"]),
    ("NL", "Nederland", &["nederland", "netherlands", "holland"]),
    ("DE", "Duitsland", &["duitsland", "germany", "deutschland"]),
    ("FR", "Frankrijk", &["frankrijk", "france"]),
    ("LU", "Luxemburg", &["luxemburg", "luxembourg"]),
    ("AT", "Oostenrijk", &["oostenrijk", "austria", "osterreich"]),
    ("CH", "Zwitserland", &["zwitserland", "switzerland", "schweiz"]),
    ("IT", "Italië", &["italie", "italy", "italia"]),
    ("ES", "Spanje", &["spanje", "spain", "espana"]),
    ("PT", "Portugal", &["portugal"]),
    ("PL", "Polen", &["polen", "poland", "polska"]),
    ("CZ", "Tsjechië", &["tsjechie", "czechia", "tsjechie republiek"]),
    ("DK", "Denemarken", &["denemarken", "denmark"]),
    ("HU", "Hongarije", &["hongarije", "hungary"]),
    ("SI", "Slovenië", &["slovenie", "slovenia"]),
    ("SK", "Slowakije", &["slowakije", "slovakia"]),
];

/// Dutch display name for a 2-letter code
pub fn display_name(code: &str) -> Option<&'static str> {
    let wanted = code.trim().to_uppercase();
    COUNTRIES
        .iter()
        .find(|(candidate, _, _)| *candidate == wanted)
        .map(|(_, name, _)| *name)
}

/// Dutch display name, falling back to the code itself when unknown
pub fn display_name_or_code(code: &str) -> String {
    match display_name(code) {
        Some(name) => name.to_string(),
        None => code.trim().to_uppercase(),
    }
}

/// Resolve free-text country input to a 2-letter code
///
/// Accepts the code itself, the Dutch name and common foreign spellings,
/// ignoring case and diacritics.
pub fn country_code(free_text: &str) -> Option<&'static str> {
    let folded = fold(free_text);
    if folded.is_empty() {
        return None;
    }
    for (code, dutch_name, aliases) in COUNTRIES {
        if folded.eq_ignore_ascii_case(code)
            || fold(dutch_name) == folded
            || aliases.contains(&folded.as_str())
        {
            return Some(code);
        }
    }
    None
}

/// Lowercase and strip the diacritics that show up in country spellings
fn fold(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| match c {
            'à' | 'á' | 'â' | 'ä' | 'å' => 'a',
            'è' | 'é' | 'ê' | 'ë' => 'e',
            'ì' | 'í' | 'î' | 'ï' => 'i',
            'ò' | 'ó' | 'ô' | 'ö' => 'o',
            'ù' | 'ú' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            other => other,
        })
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .trim()
        .to_string()
}
