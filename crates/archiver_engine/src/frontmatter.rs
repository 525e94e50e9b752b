use chrono::{DateTime, Utc};

/// YAML front matter for a Markdown document.
///
/// Only values derived from the post go in, so identical posts render to identical
/// bytes on every run.
pub fn build_front_matter(title: &str, published: &DateTime<Utc>, stable_id: &str) -> String {
    format!(
        "---\ntitle: {title}\ndate: {date}\nid: {id}\n---\n\n",
        title = yaml_scalar(title),
        date = published.format("%Y-%m-%d"),
        id = yaml_scalar(stable_id),
    )
}

fn yaml_scalar(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value.starts_with([' ', '-', '?', '[', '{', '!', '&', '*', '#', '|', '>', '%', '@', '`', '\'', '"'])
        || value.ends_with(' ')
        || value.contains(": ")
        || value.contains(" #")
        || value.contains('\n')
        || resolves_to_non_string(value);
    if !needs_quotes {
        return value.to_string();
    }
    let escaped = value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n");
    format!("\"{escaped}\"")
}

/// Plain scalars YAML would read back as a bool, null, number, or timestamp.
fn resolves_to_non_string(value: &str) -> bool {
    const KEYWORDS: &[&str] = &[
        "~", "null", "true", "false", "yes", "no", "on", "off", "y", "n", ".nan", ".inf",
        "-.inf", "+.inf",
    ];
    if KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(value)) {
        return true;
    }
    if value.parse::<f64>().is_ok() {
        return true;
    }
    let lower = value.to_ascii_lowercase();
    if lower.starts_with("0x") || lower.starts_with("0o") || lower.starts_with("0b") {
        return true;
    }
    value.starts_with(|c: char| c.is_ascii_digit() || c == '+' || c == '.')
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | ':' | '.' | '_' | 'e' | 'E' | 'T' | 'Z' | ' '))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn quotes_only_when_needed() {
        let date = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        assert_eq!(
            build_front_matter("Plain title", &date, "abc"),
            "---\ntitle: Plain title\ndate: 2024-05-06\nid: abc\n---\n\n"
        );
        assert_eq!(
            build_front_matter("Q: \"why\"", &date, "42"),
            "---\ntitle: \"Q: \\\"why\\\"\"\ndate: 2024-05-06\nid: \"42\"\n---\n\n"
        );
    }

    #[test]
    fn keywords_and_numbers_stay_strings() {
        let date = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        for title in ["null", "True", "yes", "~", "1.5", "-3", "1e3", "0x1F", "2024-01-01", "12:30", ".inf"] {
            let front = build_front_matter(title, &date, "abc");
            assert!(
                front.starts_with(&format!("---\ntitle: \"{title}\"\n")),
                "{title}: {front}"
            );
        }
        for title in ["Nullable", "Yes we can", "1984 revisited", "v1.5"] {
            let front = build_front_matter(title, &date, "abc");
            assert!(front.starts_with(&format!("---\ntitle: {title}\n")), "{title}: {front}");
        }
    }
}
