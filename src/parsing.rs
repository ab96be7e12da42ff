//! Small parsing helpers: plain functions over `&str`, errors via
//! `stacked_errors`.

use stacked_errors::{Result, StackableErr};

/// Parses a `KEY=value` environment file as used by `--environment-file` and
/// the `.s2i/environment` convention in the source tree. Blank lines and
/// lines starting with `#` are skipped; values are not
/// further quote-unescaped, matching the historical s2i format.
///
/// ```
/// use s2i_core::parsing::parse_env_file;
///
/// let contents = "# a comment\nFOO=bar\n\nBAZ=1=2\n";
/// let parsed = parse_env_file(contents).unwrap();
/// assert_eq!(parsed, vec![
///     ("FOO".to_string(), "bar".to_string()),
///     ("BAZ".to_string(), "1=2".to_string()),
/// ]);
/// ```
pub fn parse_env_file(contents: &str) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    for (lineno, line) in contents.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let (key, value) = trimmed
            .split_once('=')
            .stack_err(|| format!("parse_env_file -> line {} has no '=': {trimmed:?}", lineno + 1))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(stacked_errors::Error::from(format!(
                "parse_env_file -> line {} has an empty key",
                lineno + 1
            )));
        }
        out.push((key.to_string(), value.to_string()));
    }
    Ok(out)
}

/// Splits a `user[:group]` runtime-user specifier into its parts, used both
/// to pass `--user` to container creation and to check a resolved image user
/// against `BuildRequest::allowed_uids`.
///
/// ```
/// use s2i_core::parsing::split_user_group;
///
/// assert_eq!(split_user_group("1001"), ("1001", None));
/// assert_eq!(split_user_group("1001:0"), ("1001", Some("0")));
/// ```
pub fn split_user_group(spec: &str) -> (&str, Option<&str>) {
    match spec.split_once(':') {
        Some((user, group)) => (user, Some(group)),
        None => (spec, None),
    }
}

/// True if `user`'s uid part is present in `allowed`. An empty `allowed`
/// list means "no restriction".
pub fn uid_is_allowed(user: &str, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    let (uid, _group) = split_user_group(user);
    allowed.iter().any(|a| a == uid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_file_skips_blank_and_comment_lines() {
        let parsed = parse_env_file("\n# comment\nA=1\n  \nB=two words\n").unwrap();
        assert_eq!(
            parsed,
            vec![("A".to_string(), "1".to_string()), ("B".to_string(), "two words".to_string())]
        );
    }

    #[test]
    fn env_file_rejects_missing_equals() {
        assert!(parse_env_file("NOEQUALS").is_err());
    }

    #[test]
    fn uid_allow_list_empty_means_unrestricted() {
        assert!(uid_is_allowed("1001", &[]));
    }

    #[test]
    fn uid_allow_list_checks_uid_part_only() {
        let allowed = vec!["1001".to_string()];
        assert!(uid_is_allowed("1001:0", &allowed));
        assert!(!uid_is_allowed("1002:0", &allowed));
    }
}
