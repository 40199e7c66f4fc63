use std::fmt;

/// Key of a Sensu entity label derived from a metric, attribute or parameter name.
///
/// All label keys referenced by generated commands go through this type, so the
/// command templates and the entity labels always agree on the spelling.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelName(String);

impl LabelName {
    /// Lower-cases `name` and maps `.` and `-` to `_`.
    pub fn new(name: &str) -> Self {
        LabelName(
            name.chars()
                .map(|c| match c {
                    '.' | '-' => '_',
                    c => c.to_ascii_lowercase(),
                })
                .collect(),
        )
    }

    /// Label for a command-line flag: leading dashes stripped, inner dashes mapped to `_`.
    pub fn from_flag(flag: &str) -> Self {
        LabelName::new(flag.trim().trim_start_matches('-'))
    }

    /// Label carrying an extension value together with its flag, `<flag>__<attribute>`.
    pub fn flagged(flag: &str, attribute: &str) -> Self {
        LabelName(format!(
            "{}__{}",
            LabelName::from_flag(flag).0,
            LabelName::new(attribute).0
        ))
    }

    /// Label carrying a per-host parameter override, `<metric>_<parameter>`.
    pub fn parameter(metric: &str, parameter: &str) -> Self {
        LabelName(format!(
            "{}_{}",
            LabelName::new(metric).0,
            LabelName::from_flag(parameter).0
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `{{ .labels.<key> }}`
    pub fn template(&self) -> String {
        format!("{{{{ .labels.{} }}}}", self.0)
    }

    /// `{{ .labels.<key> | default '<value>' }}`
    pub fn template_with_default(&self, default: &str) -> String {
        format!("{{{{ .labels.{} | default '{}' }}}}", self.0, default)
    }
}

impl fmt::Display for LabelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LabelName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<LabelName> for String {
    fn from(label: LabelName) -> Self {
        label.0
    }
}
