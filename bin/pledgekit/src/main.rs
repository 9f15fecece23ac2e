//! pledgekit is a CLI tool to deploy the Pledge contracts, on a local node or a public testnet.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};

use cli::{Cli, OutputFormat};
use pledgekit_deploy::{AddressBook, DeployerBuilder, ExecutionReport, StepOutcome};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let deployer = deployer_builder(&cli).build()?;

    // Save the resolved configuration next to the deployments before deploying
    deployer.save_config()?;

    let report = deployer.deploy().await?;

    match cli.output {
        OutputFormat::Table => print_tables(&report),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?
        ),
    }

    if let Some(error) = report.error {
        anyhow::bail!("Deployment to {} halted: {}", report.network, error);
    }

    Ok(())
}

/// Map the command line onto a builder. Flags left unset defer to the config files.
fn deployer_builder(cli: &Cli) -> DeployerBuilder {
    let mut builder = DeployerBuilder::new().no_user_config(cli.no_user_config);

    if cli.redeploy {
        builder = builder.redeploy(true);
    }
    if let Some(network) = cli.network {
        builder = builder.network(network);
    }
    if let Some(rpc_url) = &cli.rpc_url {
        builder = builder.rpc_url(rpc_url.clone());
    }
    if let Some(deployments) = &cli.deployments {
        builder = builder.deployments(deployments);
    }
    if let Some(artifacts) = &cli.artifacts {
        builder = builder.artifacts(artifacts);
    }
    if let Some(index) = cli.account_index {
        builder = builder.account_index(index);
    }
    if let Some(api_key) = &cli.etherscan_api_key {
        builder = builder.etherscan_api_key(api_key);
    }
    if let Some(config) = &cli.config {
        builder = builder.config(config);
    }
    if !cli.tags.is_empty() {
        builder = builder.tags(cli.tags.clone());
    }

    builder
}

fn status(outcome: &StepOutcome) -> &'static str {
    match outcome {
        StepOutcome::Deployed => "deployed",
        StepOutcome::Skipped => "skipped",
        StepOutcome::Failed { .. } => "failed",
        StepOutcome::NotAttempted => "not attempted",
    }
}

fn print_tables(report: &ExecutionReport) {
    let mut steps = Table::new();
    steps
        .load_preset(UTF8_FULL)
        .set_header(vec!["Step", "Status", "Contract", "Address"]);

    for step in &report.steps {
        if step.records.is_empty() {
            steps.add_row(vec![step.name.as_str(), status(&step.outcome), "", ""]);
            continue;
        }
        for record in &step.records {
            steps.add_row(vec![
                step.name.clone(),
                status(&step.outcome).to_string(),
                record.name.clone(),
                record.address.to_string(),
            ]);
        }
    }
    println!("{steps}");

    if !report.verifications.is_empty() {
        let mut verifications = Table::new();
        verifications
            .load_preset(UTF8_FULL)
            .set_header(vec!["Contract", "Address", "Verification"]);
        for outcome in &report.verifications {
            let result = match (outcome.attempted, outcome.succeeded) {
                (false, _) => "skipped".to_string(),
                (true, true) => "verified".to_string(),
                (true, false) => outcome.error_message.clone().unwrap_or_default(),
            };
            verifications.add_row(vec![
                outcome.contract_name.clone(),
                outcome.address.to_string(),
                result,
            ]);
        }
        println!("{verifications}");
    }

    println!("{}", address_table(&report.addresses));

    println!(
        "{} addresses registered on {}",
        report.addresses.len(),
        report.network
    );
}

fn address_table(addresses: &AddressBook) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["Name", "Address"]);
    for (name, address) in addresses.iter() {
        table.add_row(vec![name.clone(), address.to_string()]);
    }
    table
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::*;

    fn parse(temp_dir: &TempDir, args: &[&str]) -> Cli {
        let config = temp_dir.path().to_string_lossy().into_owned();
        let mut argv = vec!["pledgekit", "--no-user-config", "--config", config.as_str()];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_config_file_redeploy_is_kept_without_flag() {
        let temp_dir = TempDir::new("pledgekit-test").expect("Failed to create temp dir");
        std::fs::write(
            temp_dir.path().join("Pledgekit.toml"),
            "network = \"localhost\"\nredeploy = true\n",
        )
        .unwrap();

        let deployer = deployer_builder(&parse(&temp_dir, &[])).build().unwrap();
        assert!(deployer.redeploy);

        let deployer = deployer_builder(&parse(&temp_dir, &["--redeploy"]))
            .build()
            .unwrap();
        assert!(deployer.redeploy);
    }

    #[test]
    fn test_redeploy_defaults_to_off() {
        let temp_dir = TempDir::new("pledgekit-test").expect("Failed to create temp dir");
        let deployer = deployer_builder(&parse(&temp_dir, &["--network", "localhost"]))
            .build()
            .unwrap();
        assert!(!deployer.redeploy);
    }

    #[test]
    fn test_address_table_lists_every_record() {
        let book: AddressBook = serde_json::from_value(serde_json::json!({
            "MockOracle": "0x0000000000000000000000000000000000000011",
            "multiSignature": "0x0000000000000000000000000000000000000022",
        }))
        .unwrap();

        let table = address_table(&book);
        assert_eq!(table.row_count(), 2);

        let rendered = table.to_string();
        assert!(rendered.contains("MockOracle"));
        assert!(rendered.contains("0x0000000000000000000000000000000000000022"));
    }
}
