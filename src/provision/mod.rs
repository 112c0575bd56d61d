//! Provision AWS SSO profiles with VPC endpoint overrides.
//!
//! Every profile of a profile table is written into the AWS config file,
//! along with an `endpoint_url` for each service reachable through an
//! interface VPC endpoint in that profile's account. Other sections of
//! the config file are left untouched.
use clap::{App, Arg, ArgMatches, SubCommand};

use std::env;
use std::path::{Path, PathBuf};

use crate::cli;
use crate::types::UtilResult;

pub mod endpoints;
pub mod ini;
pub mod profiles;

use self::endpoints::{Ec2Endpoints, EndpointSource};
use self::ini::{ConfigDocument, Value};
use self::profiles::{ProfileSpec, ProfileTable};

/// Generates an appropriate `SubCommand` for this module.
pub fn cmd<'a, 'b>() -> App<'a, 'b> {
    SubCommand::with_name("provision")
        .about("Write SSO profiles with VPC endpoint overrides to the AWS config")
        .args(&cli::global_args())
        .args(&[
            Arg::with_name("profiles")
                .help("A TOML file listing the profiles to provision")
                .index(1)
                .required(true),
            Arg::with_name("config")
                .help("The AWS config file to update [default: ~/.aws/config]")
                .long("config")
                .takes_value(true),
        ])
}

/// Executes this subcommand and returns a `UtilResult` to indicate success.
pub async fn exec(args: &ArgMatches<'_>) -> UtilResult<()> {
    let table = ProfileTable::load(Path::new(cli::required(args, "profiles")?))?;
    let path = config_path(
        args.value_of("config"),
        env::var_os("AWS_CONFIG_FILE"),
        env::var_os("HOME"),
    )?;

    let mut document = ConfigDocument::load(&path)?;
    provision(&Ec2Endpoints, &table, &mut document).await?;

    // dry runs print the result instead
    if cli::is_dry_run(args) {
        print!("{}", document.render());
        return Ok(());
    }

    document.save(&path)?;
    info!("AWS config updated at {}", path.display());
    Ok(())
}

/// Discovers endpoints for every profile, then writes them all.
///
/// Discovery happens for all profiles before anything is written, so a
/// failure for any profile leaves the document untouched.
pub async fn provision(
    source: &dyn EndpointSource,
    table: &ProfileTable,
    document: &mut ConfigDocument,
) -> UtilResult<()> {
    let mut discovered = Vec::with_capacity(table.profiles.len());

    for profile in &table.profiles {
        info!("Discovering VPC endpoints for {}...", profile.name);

        let records = source.endpoints(profile).await.map_err(|err| {
            format!("Unable to list VPC endpoints for {}: {}", profile.name, err)
        })?;

        let services = endpoints::match_services(&records, &table.services);
        for (service, host) in &services {
            info!("Found {} endpoint for {}: {}", service, profile.name, host);
        }

        discovered.push((profile, services));
    }

    for (profile, services) in discovered {
        apply_profile(document, profile, &services);
    }

    Ok(())
}

/// Writes a profile and its endpoint overrides into its section.
pub fn apply_profile(document: &mut ConfigDocument, profile: &ProfileSpec, services: &[(String, String)]) {
    let section = document.section_mut(&profile.section_name());

    let settings = [
        ("sso_start_url", &profile.sso_start_url),
        ("sso_region", &profile.sso_region),
        ("sso_account_id", &profile.sso_account_id),
        ("sso_role_name", &profile.sso_role_name),
        ("region", &profile.region),
        ("output", &profile.output),
    ];

    for (key, value) in &settings {
        section.set(key, Value::Plain(value.to_string()));
    }

    for (service, host) in services {
        let endpoint = ("endpoint_url".to_string(), format!("https://{}", host));
        section.set(service, Value::Nested(vec![endpoint]));
    }
}

/// Resolves the location of the AWS config file.
///
/// An explicit path wins, then `$AWS_CONFIG_FILE`, then `~/.aws/config`.
fn config_path<T>(explicit: Option<&str>, env_file: Option<T>, home: Option<T>) -> UtilResult<PathBuf>
where
    T: Into<PathBuf>,
{
    if let Some(path) = explicit {
        return Ok(PathBuf::from(path));
    }
    if let Some(path) = env_file {
        return Ok(path.into());
    }
    match home {
        Some(home) => Ok(home.into().join(".aws").join("config")),
        None => Err("Unable to locate the AWS config file, use --config".into()),
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use std::path::PathBuf;

    use super::endpoints::{EndpointRecord, EndpointSource};
    use super::ini::{ConfigDocument, Value};
    use super::profiles::{ProfileSpec, ProfileTable};
    use crate::types::UtilResult;

    const TABLE: &str = r#"
        services = ["s3", "ec2", "sts"]

        [[profile]]
        name = "prod"
        sso_start_url = "https://portal.awsapps.com/start"
        sso_region = "us-east-1"
        sso_account_id = "123456789012"
        sso_role_name = "ProdAdmin"
        region = "us-east-1"

        [[profile]]
        name = "dev"
        sso_start_url = "https://portal.awsapps.com/start"
        sso_region = "us-west-2"
        sso_account_id = "210987654321"
        sso_role_name = "DevPowerUser"
        region = "us-west-2"
    "#;

    /// Endpoint source answering from a fixed list, failing for `dev`
    /// when asked to.
    struct StaticEndpoints {
        fail_dev: bool,
    }

    #[async_trait]
    impl EndpointSource for StaticEndpoints {
        async fn endpoints(&self, profile: &ProfileSpec) -> UtilResult<Vec<EndpointRecord>> {
            if self.fail_dev && profile.name == "dev" {
                return Err("AccessDenied".into());
            }

            Ok(vec![
                EndpointRecord {
                    endpoint_type: "Interface".to_string(),
                    service_name: format!("com.amazonaws.{}.s3", profile.region),
                    dns_names: vec![format!("vpce-{}.s3.example.com", profile.name)],
                },
                EndpointRecord {
                    endpoint_type: "Gateway".to_string(),
                    service_name: format!("com.amazonaws.{}.sts", profile.region),
                    dns_names: vec!["gateway.example.com".to_string()],
                },
            ])
        }
    }

    fn plain(value: &str) -> Value {
        Value::Plain(value.to_string())
    }

    #[tokio::test]
    async fn provisioning_every_profile() {
        let table = ProfileTable::parse(TABLE).unwrap();
        let mut document = ConfigDocument::parse("[default]\nregion = eu-west-1\n").unwrap();

        super::provision(&StaticEndpoints { fail_dev: false }, &table, &mut document)
            .await
            .unwrap();

        let prod = document.section("profile prod").unwrap();

        assert_eq!(prod.get("sso_start_url"), Some(&plain("https://portal.awsapps.com/start")));
        assert_eq!(prod.get("sso_region"), Some(&plain("us-east-1")));
        assert_eq!(prod.get("sso_account_id"), Some(&plain("123456789012")));
        assert_eq!(prod.get("sso_role_name"), Some(&plain("ProdAdmin")));
        assert_eq!(prod.get("region"), Some(&plain("us-east-1")));
        assert_eq!(prod.get("output"), Some(&plain("json")));
        assert_eq!(
            prod.get("s3"),
            Some(&Value::Nested(vec![(
                "endpoint_url".to_string(),
                "https://vpce-prod.s3.example.com".to_string()
            )]))
        );
        assert_eq!(prod.get("sts"), None);
        assert_eq!(prod.get("ec2"), None);

        assert!(document.section("profile dev").is_some());
        assert_eq!(
            document.section("default").unwrap().entries,
            vec![("region".to_string(), plain("eu-west-1"))]
        );
    }

    #[tokio::test]
    async fn overwriting_existing_profiles() {
        let table = ProfileTable::parse(TABLE).unwrap();
        let mut document = ConfigDocument::parse(
            "[profile prod]\nregion = eu-central-1\ncli_pager =\nsso_role_name = Old\n",
        )
        .unwrap();

        super::provision(&StaticEndpoints { fail_dev: false }, &table, &mut document)
            .await
            .unwrap();

        let prod = document.section("profile prod").unwrap();
        let keys: Vec<&str> = prod.entries.iter().map(|(k, _)| k.as_str()).collect();

        assert_eq!(prod.get("region"), Some(&plain("us-east-1")));
        assert_eq!(prod.get("sso_role_name"), Some(&plain("ProdAdmin")));
        assert_eq!(prod.get("cli_pager"), Some(&plain("")));
        assert_eq!(&keys[..3], &["region", "cli_pager", "sso_role_name"]);
    }

    #[tokio::test]
    async fn aborting_on_the_first_failure() {
        let table = ProfileTable::parse(TABLE).unwrap();
        let original = ConfigDocument::parse("[default]\nregion = eu-west-1\n").unwrap();
        let mut document = original.clone();

        let err = super::provision(&StaticEndpoints { fail_dev: true }, &table, &mut document)
            .await
            .unwrap_err();

        assert_eq!(err.message(), "Unable to list VPC endpoints for dev: AccessDenied");
        assert_eq!(document, original);
    }

    #[test]
    fn resolving_the_config_path() {
        let explicit = super::config_path(Some("/tmp/config"), Some("/env"), Some("/home/me"));
        let env_file = super::config_path(None, Some("/env/config"), Some("/home/me"));
        let home = super::config_path(None, None, Some("/home/me"));
        let nothing = super::config_path::<&str>(None, None, None);

        assert_eq!(explicit.unwrap(), PathBuf::from("/tmp/config"));
        assert_eq!(env_file.unwrap(), PathBuf::from("/env/config"));
        assert_eq!(home.unwrap(), PathBuf::from("/home/me/.aws/config"));
        assert!(nothing.is_err());
    }
}
