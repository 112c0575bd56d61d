//! Reading and writing of the AWS CLI config file.
//!
//! The file is INI-like: `[section]` headers followed by `key = value`
//! lines. A key with an empty value may be followed by indented lines,
//! which form a nested block of settings (this is how per-service
//! settings such as `endpoint_url` are expressed). Comments are not
//! preserved when the file is written back.
use std::fmt::Write as _;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::types::UtilResult;

/// Indentation used for nested settings.
const INDENT: &str = "    ";

/// The value of a single setting.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Plain(String),
    Nested(Vec<(String, String)>),
}

/// A named section and its settings, in file order.
#[derive(Clone, Debug, PartialEq)]
pub struct Section {
    pub name: String,
    pub entries: Vec<(String, Value)>,
}

impl Section {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: Vec::new(),
        }
    }

    /// Fetches the value of a setting.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }

    /// Sets a setting, overwriting it in place when it already exists.
    pub fn set(&mut self, key: &str, value: Value) {
        match self.entries.iter_mut().find(|(name, _)| name == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }
}

/// An in-memory AWS config file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConfigDocument {
    sections: Vec<Section>,
}

impl ConfigDocument {
    /// Loads a config file, treating a missing file as empty.
    pub fn load(path: &Path) -> UtilResult<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents)
                .map_err(|err| format!("{}: {}", path.display(), err).into()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err.into()),
        }
    }

    /// Parses the contents of a config file.
    pub fn parse(contents: &str) -> UtilResult<Self> {
        let mut document = Self::default();

        for (index, raw) in contents.lines().enumerate() {
            let number = index + 1;
            let line = raw.trim_end();
            let trimmed = line.trim_start();

            // blank lines and comments
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }

            // indented lines belong to the previous key
            if trimmed.len() != line.len() {
                let (key, value) = split_pair(trimmed, number)?;
                let entry = document
                    .sections
                    .last_mut()
                    .and_then(|section| section.entries.last_mut())
                    .ok_or_else(|| format!("line {}: unexpected indented line", number))?;

                // only an empty value can open a nested block
                if let Value::Plain(plain) = &entry.1 {
                    if !plain.is_empty() {
                        return Err(format!("line {}: unexpected indented line", number).into());
                    }
                    entry.1 = Value::Nested(Vec::new());
                }

                if let Value::Nested(pairs) = &mut entry.1 {
                    pairs.push((key, value));
                }
                continue;
            }

            // section headers
            if line.starts_with('[') {
                if !line.ends_with(']') || line.len() < 3 {
                    return Err(format!("line {}: malformed section header", number).into());
                }

                let name = line[1..line.len() - 1].trim();
                if document.section(name).is_some() {
                    return Err(format!("line {}: duplicate section [{}]", number, name).into());
                }

                document.sections.push(Section::new(name));
                continue;
            }

            // plain settings
            let (key, value) = split_pair(line, number)?;
            let section = document
                .sections
                .last_mut()
                .ok_or_else(|| format!("line {}: setting outside of any section", number))?;

            if section.get(&key).is_some() {
                return Err(format!("line {}: duplicate setting '{}'", number, key).into());
            }

            section.entries.push((key, Value::Plain(value)));
        }

        Ok(document)
    }

    /// Renders the document back into config file syntax.
    pub fn render(&self) -> String {
        let mut output = String::new();

        for (index, section) in self.sections.iter().enumerate() {
            if index > 0 {
                output.push('\n');
            }

            let _ = writeln!(output, "[{}]", section.name);

            for (key, value) in &section.entries {
                match value {
                    Value::Plain(plain) if plain.is_empty() => {
                        let _ = writeln!(output, "{} =", key);
                    }
                    Value::Plain(plain) => {
                        let _ = writeln!(output, "{} = {}", key, plain);
                    }
                    Value::Nested(pairs) => {
                        let _ = writeln!(output, "{} =", key);
                        for (name, nested) in pairs {
                            let _ = writeln!(output, "{}{} = {}", INDENT, name, nested);
                        }
                    }
                }
            }
        }

        output
    }

    /// Writes the document to disk, creating parent directories as needed.
    ///
    /// The content is written to a sibling file first and then renamed
    /// over the target, so readers never observe a partial file. Symlinks
    /// are followed, so the file they point at is the one replaced, and
    /// the permissions of an existing file are kept.
    pub fn save(&self, path: &Path) -> UtilResult<()> {
        // write through links rather than replacing them
        let target = match fs::canonicalize(path) {
            Ok(resolved) => resolved,
            Err(err) if err.kind() == ErrorKind::NotFound => path.to_path_buf(),
            Err(err) => return Err(err.into()),
        };

        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let permissions = match fs::metadata(&target) {
            Ok(metadata) => Some(metadata.permissions()),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => return Err(err.into()),
        };

        let mut staging = target.as_os_str().to_owned();
        staging.push(".tmp");

        fs::write(&staging, self.render())?;

        // the staged file is created with default permissions
        if let Some(permissions) = permissions {
            fs::set_permissions(&staging, permissions)?;
        }

        fs::rename(&staging, &target)?;
        Ok(())
    }

    /// Fetches a section by name.
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|section| section.name == name)
    }

    /// Fetches a section by name, appending an empty one if missing.
    pub fn section_mut(&mut self, name: &str) -> &mut Section {
        let index = match self.sections.iter().position(|s| s.name == name) {
            Some(index) => index,
            None => {
                self.sections.push(Section::new(name));
                self.sections.len() - 1
            }
        };
        &mut self.sections[index]
    }

    /// Every section, in file order.
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }
}

/// Splits a `key = value` line, trimming both sides.
fn split_pair(line: &str, number: usize) -> UtilResult<(String, String)> {
    let mut splitn = line.splitn(2, '=');

    match (splitn.next(), splitn.next()) {
        (Some(key), Some(value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("line {}: expected 'key = value'", number).into()),
    }
}
