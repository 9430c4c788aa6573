//! Source clean-up and precision injection applied before compilation.

use super::Precision;

/// Name of the float alias the precision directive declares.
pub const PRECISION_ALIAS: &str = "pfloat";

/// Removes `//` and (nested) `/* */` comments, trims every line and drops
/// blank lines.
pub fn minify(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut depth = 0usize;

    while let Some(c) = chars.next() {
        match (c, chars.peek().copied()) {
            ('/', Some('*')) => {
                chars.next();
                depth += 1;
            }
            ('*', Some('/')) if depth > 0 => {
                chars.next();
                depth -= 1;
                // Keep tokens on either side of the comment apart.
                if depth == 0 {
                    out.push(' ');
                }
            }
            ('/', Some('/')) if depth == 0 => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('\n', _) => out.push('\n'),
            _ if depth > 0 => {}
            _ => out.push(c),
        }
    }

    out.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Whether the source already declares the precision alias.
pub fn has_precision_directive(source: &str) -> bool {
    source.lines().any(|line| {
        let mut tokens = line.split_whitespace();
        tokens.next() == Some("alias")
            && tokens.next().map(|t| t.trim_end_matches('=')) == Some(PRECISION_ALIAS)
    })
}

/// Whether a minified line is a global directive, which WGSL only accepts
/// ahead of every declaration.
fn is_global_directive(line: &str) -> bool {
    let keyword = line
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .next()
        .unwrap_or_default();
    matches!(keyword, "enable" | "requires" | "diagnostic")
}

fn enables_f16(line: &str) -> bool {
    line.strip_prefix("enable").is_some_and(|rest| {
        rest.trim_end_matches(';')
            .split(',')
            .any(|ext| ext.trim() == "f16")
    })
}

/// Minifies `source` and inserts one precision alias after its leading
/// global directives, unless the source declares its own. Medium precision
/// also adds `enable f16;` when the source does not enable it already.
pub fn prepare(source: &str, precision: Precision) -> String {
    let body = minify(source);
    if has_precision_directive(&body) {
        return body;
    }

    let lines: Vec<&str> = body.lines().collect();
    let split = lines.iter().take_while(|l| is_global_directive(l)).count();
    let (directives, declarations) = lines.split_at(split);

    let mut out = Vec::with_capacity(lines.len() + 2);
    if precision == Precision::Medium && !directives.iter().any(|l| enables_f16(l)) {
        out.push("enable f16;");
    }
    out.extend_from_slice(directives);
    out.push(precision.alias());
    out.extend_from_slice(declarations);
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_line_and_block_comments() {
        let src = "// header\nfn a() {} /* inline */ fn b() {}\n\n   /* multi\n line */\n";
        assert_eq!(minify(src), "fn a() {}  fn b() {}");
    }

    #[test]
    fn nested_block_comments_are_removed() {
        assert_eq!(minify("x /* a /* b */ c */ y"), "x  y");
    }

    #[test]
    fn injects_exactly_one_directive() {
        let out = prepare("fn f() {}", Precision::High);
        assert_eq!(out, "alias pfloat = f32;\nfn f() {}");
        assert_eq!(out.matches("alias pfloat").count(), 1);
    }

    #[test]
    fn existing_directive_is_respected() {
        let src = "alias pfloat = f32;\nfn f() {}";
        assert_eq!(prepare(src, Precision::Medium), src);
    }

    #[test]
    fn medium_reuses_an_existing_f16_enable() {
        let out = prepare("enable f16;\nfn f() {}", Precision::Medium);
        assert_eq!(out, "enable f16;\nalias pfloat = f16;\nfn f() {}");
    }

    #[test]
    fn medium_enables_f16_ahead_of_other_directives() {
        let out = prepare("requires packed_4x8_integer_dot_product;\nfn f() {}", Precision::Medium);
        assert_eq!(
            out,
            "enable f16;\nrequires packed_4x8_integer_dot_product;\nalias pfloat = f16;\nfn f() {}"
        );
    }

    #[test]
    fn alias_follows_every_leading_directive() {
        let src = "// header\nenable f16;\ndiagnostic(off, derivative_uniformity);\nfn f() {}";
        let out = prepare(src, Precision::High);
        assert_eq!(
            out,
            "enable f16;\ndiagnostic(off, derivative_uniformity);\nalias pfloat = f32;\nfn f() {}"
        );
    }

    #[test]
    fn f16_is_found_in_an_extension_list() {
        assert!(enables_f16("enable clip_distances, f16;"));
        assert!(!enables_f16("enable f16_like;"));
        assert!(!is_global_directive("@diagnostic(off, derivative_uniformity) fn f() {}"));
    }

    #[test]
    fn detects_alias_without_spaces_around_equals() {
        assert!(has_precision_directive("alias pfloat= f32;"));
        assert!(!has_precision_directive("alias other = f32;"));
    }
}
