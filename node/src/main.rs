// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # MELD Node
//!
//! Entry point for the `meld-node` binary. Parses CLI arguments, sets up
//! logging, opens the sled-backed identity store in the data directory and
//! runs one subcommand against it.
//!
//! Results go to stdout as JSON; logs go to stderr.

mod cli;
mod logging;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

use meld_protocol::config::ProvisioningConfig;
use meld_protocol::error::MeldError;
use meld_protocol::hardware::SimulatedTagWriter;
use meld_protocol::identity::{DeviceId, DeviceType, Did};
use meld_protocol::moment::Moment;
use meld_protocol::nfc::{
    encode_uri_record, scan_tag, ChipClass, ChipUid, DeviceDirectory, NfcCodec, NfcError,
    TagCredentials,
};
use meld_protocol::proof::{next_milestone, recommended_thresholds, ThresholdProof};
use meld_protocol::registry::{IdentityStore, ProvisionRequest, RegistryError, SeedSource};
use meld_protocol::storage::SledStore;

use cli::{Commands, GlobalArgs, MeldNodeCli};
use logging::LogFormat;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = MeldNodeCli::parse();
    logging::init_logging(
        logging::DEFAULT_FILTER,
        LogFormat::from_str_lossy(&cli.global.log_format),
    );

    let result = run(cli).await;
    if let Err(err) = &result {
        if let Some(hint) = hint_for(err) {
            eprintln!("hint: {}", hint);
        }
    }
    result
}

async fn run(cli: MeldNodeCli) -> Result<()> {
    let global = cli.global;
    match cli.command {
        Commands::Version => {
            print_version();
            Ok(())
        }
        Commands::Thresholds(args) => {
            print_json(&json!({
                "count": args.count,
                "thresholds": recommended_thresholds(args.count),
                "next": next_milestone(args.count),
            }))
        }
        Commands::VerifyMoment(args) => {
            let moment = Moment::from_json(&args.moment).context("failed to parse moment")?;
            let valid = moment.verify_with_issuer();
            let fresh = moment.is_fresh();
            print_json(&json!({
                "valid": valid && (!args.fresh || fresh),
                "signatureValid": valid,
                "fresh": fresh,
            }))
        }
        Commands::VerifyProof(args) => {
            let proof = ThresholdProof::from_json(&args.proof).context("failed to parse proof")?;
            print_json(&json!({
                "valid": proof.verify(),
                "passes": proof.passes(),
                "threshold": proof.threshold,
                "actualCount": proof.actual_count,
            }))
        }
        command => run_with_store(&global, command).await,
    }
}

/// Subcommands that need the identity store.
async fn run_with_store(global: &GlobalArgs, command: Commands) -> Result<()> {
    let store = open_store(global)?;

    match command {
        Commands::Init(args) => {
            let source = match args.seed.as_deref() {
                Some(seed) => SeedSource::from_hex(seed)?,
                None => SeedSource::Random,
            };
            let did = store.initialize_identity(source).await?;
            tracing::info!(did = %did, data_dir = %global.data_dir.display(), "identity ready");
            print_json(&json!({
                "did": did,
                "dataDir": global.data_dir.display().to_string(),
                "didDocument": did.to_did_document(),
            }))
        }
        Commands::Register(args) => {
            let device_type = parse_device_type(&args.device_type)?;
            let device_id = store.register_device(&args.name, device_type).await?;
            let device = store.device(&device_id).await?;
            print_json(&device)
        }
        Commands::Devices => print_json(&store.devices().await?),
        Commands::Bind(args) => {
            let device_id = parse_device_id(&args.device)?;
            let uid: ChipUid = args.uid.parse()?;
            print_json(&store.bind_chip(&device_id, uid).await?)
        }
        Commands::Authenticate(args) => {
            let device_id = parse_device_id(&args.device)?;
            let signature = store
                .authenticate_locally(&device_id, args.challenge.as_bytes())
                .await?;
            let device = store.device(&device_id).await?;
            print_json(&json!({
                "deviceId": device_id,
                "challenge": args.challenge,
                "signature": signature,
                "publicKey": device.public_key,
                "verified": IdentityStore::verify_locally(
                    &signature,
                    args.challenge.as_bytes(),
                    &device.public_key,
                ),
            }))
        }
        Commands::SignMoment(args) => {
            let subject: Did = args.subject.parse().context("invalid subject DID")?;
            let moment = store.sign_moment(subject, &args.description).await?;
            println!("{}", moment.to_json()?);
            Ok(())
        }
        Commands::Prove(args) => {
            let raw = std::fs::read_to_string(&args.moments)
                .with_context(|| format!("failed to read {}", args.moments.display()))?;
            let moments: Vec<Moment> =
                serde_json::from_str(&raw).context("moments file is not a JSON array of moments")?;
            let prover = store.prover().await?;
            let proof = if args.verified_only {
                prover.generate_verified(&moments, args.threshold)?
            } else {
                prover.generate(&moments, args.threshold)?
            };
            println!("{}", proof.to_json()?);
            Ok(())
        }
        Commands::Provision(args) => {
            let mut request = ProvisionRequest::new(
                args.name,
                parse_device_type(&args.device_type)?,
                args.uid.parse()?,
            );
            if let Some(chip) = args.chip.as_deref() {
                request = request.for_chip(chip.parse()?);
            }
            // No radio on the node; the simulated writer records the bytes.
            let writer = SimulatedTagWriter::new();
            let tag = store.provision_tag(request, &writer, None).await?;
            print_json(&json!({
                "device": tag.device,
                "tier": tag.encoded.tier().to_string(),
                "url": tag.encoded.url,
                "ndef": hex::encode(&tag.encoded.ndef),
                "bytes": tag.encoded.size(),
                "budget": tag.encoded.budget,
            }))
        }
        Commands::EncodeTag(args) => {
            let device = store.device(&parse_device_id(&args.device)?).await?;
            let chip: ChipClass = args.chip.parse()?;
            let credentials = TagCredentials::for_device(&device)
                .ok_or_else(|| anyhow!("device {} is not bound to a chip yet", device.device_id))?;
            let directory = store.identity().await?;
            let encoded = NfcCodec::new(global.base_url.as_str()).encode(
                &credentials,
                chip,
                Some(&directory),
            )?;
            print_json(&json!({
                "tier": encoded.tier().to_string(),
                "url": encoded.url,
                "ndef": hex::encode(&encoded.ndef),
                "bytes": encoded.size(),
                "budget": encoded.budget,
            }))
        }
        Commands::DecodeTag(args) => {
            let codec = NfcCodec::new(global.base_url.as_str());
            // Reference tags need the registry; other tiers decode without it.
            let directory = store.identity().await.ok();
            let ndef = if args.ndef {
                hex::decode(args.input.trim()).context("--ndef input is not hex")?
            } else {
                encode_uri_record(&args.input)
            };
            let payload = codec.decode_ndef(&ndef)?;
            let physical = match args.uid.as_deref() {
                Some(uid) => uid.parse::<ChipUid>()?,
                None => payload.chip_uid().clone(),
            };
            let scanned = scan_tag(
                &codec,
                physical.as_bytes(),
                &ndef,
                directory.as_ref().map(|d| d as &dyn DeviceDirectory),
            )?;
            print_json(&json!({
                "tier": payload.tier().to_string(),
                "chipUid": scanned.physical_uid,
                "did": scanned.credentials.did,
                "publicKey": scanned.credentials.public_key,
                "deviceId": scanned.credentials.device_id,
                "authentic": scanned.authentic,
            }))
        }
        other => Err(anyhow!("{:?} does not use the identity store", other)),
    }
}

fn open_store(global: &GlobalArgs) -> Result<IdentityStore> {
    let db_path = global.data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create data directory: {}", db_path.display()))?;
    restrict_permissions(&global.data_dir)?;

    let kv = SledStore::open(&db_path)
        .with_context(|| format!("failed to open identity store at {}", db_path.display()))?;
    tracing::debug!(path = %db_path.display(), "identity store opened");

    let config = ProvisioningConfig::default().with_base_url(&global.base_url);
    Ok(IdentityStore::with_config(Arc::new(kv), config))
}

/// The data directory holds private keys; keep it owner-only on Unix.
fn restrict_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .with_context(|| format!("failed to restrict permissions on {}", path.display()))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

fn parse_device_type(s: &str) -> Result<DeviceType> {
    s.parse().map_err(|e: String| anyhow!(e))
}

fn parse_device_id(s: &str) -> Result<DeviceId> {
    s.parse()
        .with_context(|| format!("'{}' is not a device id", s))
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// The remediation hint carried by a protocol error, if any.
fn hint_for(err: &anyhow::Error) -> Option<&str> {
    err.chain().find_map(|cause| {
        if let Some(e) = cause.downcast_ref::<RegistryError>() {
            e.hint()
        } else if let Some(e) = cause.downcast_ref::<NfcError>() {
            e.hint()
        } else if let Some(e) = cause.downcast_ref::<MeldError>() {
            e.hint()
        } else {
            None
        }
    })
}

/// Prints version information to stdout.
fn print_version() {
    println!("meld-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol  {}", meld_protocol::config::PROTOCOL_VERSION);
    println!("rustc     {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}
