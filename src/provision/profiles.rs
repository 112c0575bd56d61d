//! Operator supplied table of SSO profiles to provision.
//!
//! The table is a TOML document listing the service identifiers to look
//! up endpoints for, followed by one `[[profile]]` entry per profile:
//!
//! ```toml
//! services = ["s3", "ec2", "sts"]
//!
//! [[profile]]
//! name = "prod"
//! sso_start_url = "https://my-portal.awsapps.com/start"
//! sso_region = "us-east-1"
//! sso_account_id = "123456789012"
//! sso_role_name = "ProdAdmin"
//! region = "us-east-1"
//! ```
use serde::Deserialize;

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::types::UtilResult;

/// Identity federation parameters of a single profile.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ProfileSpec {
    pub name: String,
    pub sso_start_url: String,
    pub sso_region: String,
    pub sso_account_id: String,
    pub sso_role_name: String,
    pub region: String,
    #[serde(default = "default_output")]
    pub output: String,
}

impl ProfileSpec {
    /// Name of the config file section holding this profile.
    pub fn section_name(&self) -> String {
        if self.name == "default" {
            self.name.clone()
        } else {
            format!("profile {}", self.name)
        }
    }
}

/// The full set of profiles to provision, in order.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ProfileTable {
    #[serde(default = "default_services")]
    pub services: Vec<String>,
    #[serde(rename = "profile", default)]
    pub profiles: Vec<ProfileSpec>,
}

fn default_output() -> String {
    "json".to_string()
}

fn default_services() -> Vec<String> {
    vec!["s3".to_string(), "ec2".to_string(), "sts".to_string()]
}

impl ProfileTable {
    /// Reads and validates a profile table from disk.
    pub fn load(path: &Path) -> UtilResult<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|err| format!("Unable to read {}: {}", path.display(), err))?;
        Self::parse(&contents)
    }

    /// Parses and validates a profile table.
    pub fn parse(contents: &str) -> UtilResult<Self> {
        let table: ProfileTable = toml::from_str(contents)?;
        table.validate()?;
        Ok(table)
    }

    /// Checks every profile for missing or malformed values.
    pub fn validate(&self) -> UtilResult<()> {
        if self.profiles.is_empty() {
            return Err("No profiles configured".into());
        }
        if self.services.iter().any(|service| service.trim().is_empty()) {
            return Err("Service identifiers cannot be empty".into());
        }

        let mut seen = HashSet::new();

        for profile in &self.profiles {
            let name = &profile.name;

            if name.trim().is_empty() || name.contains(char::is_whitespace) {
                return Err(format!("Invalid profile name: '{}'", name).into());
            }
            if !seen.insert(name) {
                return Err(format!("Duplicate profile: {}", name).into());
            }
            if !profile.sso_start_url.starts_with("https://") {
                return Err(format!("Profile {}: sso_start_url must use https", name).into());
            }
            if profile.sso_account_id.len() != 12
                || !profile.sso_account_id.chars().all(|c| c.is_ascii_digit())
            {
                return Err(format!("Profile {}: sso_account_id must be 12 digits", name).into());
            }

            let required = [
                ("sso_region", &profile.sso_region),
                ("sso_role_name", &profile.sso_role_name),
                ("region", &profile.region),
                ("output", &profile.output),
            ];

            for (field, value) in &required {
                if value.trim().is_empty() {
                    return Err(format!("Profile {}: {} cannot be empty", name, field).into());
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::ProfileTable;

    const TABLE: &str = r#"
        [[profile]]
        name = "prod"
        sso_start_url = "https://your-sso-portal.awsapps.com/start"
        sso_region = "us-east-1"
        sso_account_id = "123456789012"
        sso_role_name = "ProdAdmin"
        region = "us-east-1"

        [[profile]]
        name = "dev"
        sso_start_url = "https://your-sso-portal.awsapps.com/start"
        sso_region = "us-west-2"
        sso_account_id = "210987654321"
        sso_role_name = "DevPowerUser"
        region = "us-west-2"
        output = "yaml"
    "#;

    #[test]
    fn parsing_profile_tables() {
        let table = ProfileTable::parse(TABLE).unwrap();

        assert_eq!(table.services, vec!["s3", "ec2", "sts"]);
        assert_eq!(table.profiles.len(), 2);
        assert_eq!(table.profiles[0].name, "prod");
        assert_eq!(table.profiles[0].output, "json");
        assert_eq!(table.profiles[1].output, "yaml");
        assert_eq!(table.profiles[1].section_name(), "profile dev");
    }

    #[test]
    fn parsing_the_bundled_example() {
        let table = ProfileTable::parse(include_str!("../../profiles.example.toml")).unwrap();

        assert!(!table.profiles.is_empty());
        assert!(!table.services.is_empty());
    }

    #[test]
    fn naming_the_default_section() {
        let mut table = ProfileTable::parse(TABLE).unwrap();
        table.profiles[0].name = "default".to_string();

        assert_eq!(table.profiles[0].section_name(), "default");
    }

    #[test]
    fn rejecting_invalid_tables() {
        let broken = vec![
            TABLE.replace("\"dev\"", "\"prod\""),
            TABLE.replace("123456789012", "12345"),
            TABLE.replace("https://", "http://"),
            TABLE.replace("\"DevPowerUser\"", "\"\""),
            TABLE.replace("name = \"dev\"", "name = \"my dev\""),
            format!("services = [\"\"]\n{}", TABLE),
            "services = [\"s3\"]".to_string(),
            "[[profile]]\nname = \"prod\"".to_string(),
        ];

        for table in broken {
            assert!(ProfileTable::parse(&table).is_err(), "{}", table);
        }
    }
}
