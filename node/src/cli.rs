//! # CLI Interface
//!
//! Defines the command-line argument structure for `meld-node` using
//! `clap` derive. Global options (data directory, resolver base URL, log
//! format) come first and fall back to environment variables.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// MELD identity node.
///
/// Holds one did:key identity in a local data directory, registers and
/// provisions its NFC devices, and signs moments and threshold proofs.
#[derive(Parser, Debug)]
#[command(
    name = "meld-node",
    about = "MELD identity and NFC provisioning node",
    version,
    propagate_version = true
)]
pub struct MeldNodeCli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Data directory holding the identity store. Created on first use.
    #[arg(long, short = 'd', env = "MELD_DATA_DIR", default_value = ".meld", global = true)]
    pub data_dir: PathBuf,

    /// Resolver base URL written in front of every tag payload.
    #[arg(long, env = "MELD_BASE_URL", default_value = "https://meld.link", global = true)]
    pub base_url: String,

    /// Log output format: pretty or json.
    #[arg(long, env = "MELD_LOG_FORMAT", default_value = "pretty", global = true)]
    pub log_format: String,
}

/// Top-level subcommands for the MELD node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the identity, or load the existing one.
    Init(InitArgs),
    /// Register a new device under the identity.
    Register(RegisterArgs),
    /// List registered devices.
    Devices,
    /// Bind a registered device to its chip UID.
    Bind(BindArgs),
    /// Sign a challenge with a device key.
    Authenticate(AuthenticateArgs),
    /// Issue a signed moment about another participant.
    SignMoment(SignMomentArgs),
    /// Verify a moment given as JSON.
    VerifyMoment(VerifyMomentArgs),
    /// Print the milestone thresholds for a moment count.
    Thresholds(ThresholdsArgs),
    /// Generate a threshold proof over a file of moments.
    Prove(ProveArgs),
    /// Verify a threshold proof given as JSON.
    VerifyProof(VerifyProofArgs),
    /// Register a device and write its tag through the simulated writer.
    Provision(ProvisionArgs),
    /// Encode a bound device's credentials for a chip class.
    EncodeTag(EncodeTagArgs),
    /// Decode a tag URL or NDEF message and check it.
    DecodeTag(DecodeTagArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Hex-encoded 32-byte master seed to restore from.
    ///
    /// **Never pass this flag on a shared machine**; it ends up in shell history.
    #[arg(long, env = "MELD_SEED")]
    pub seed: Option<String>,
}

#[derive(Parser, Debug)]
pub struct RegisterArgs {
    /// Human-readable device name.
    #[arg(long)]
    pub name: String,

    /// Device type: passive, wearable, card, reader or mobile.
    #[arg(long = "type", default_value = "passive")]
    pub device_type: String,
}

#[derive(Parser, Debug)]
pub struct BindArgs {
    #[arg(long)]
    pub device: String,

    /// Chip UID, e.g. 04:A2:3B:1C:5D:6E:80.
    #[arg(long)]
    pub uid: String,
}

#[derive(Parser, Debug)]
pub struct AuthenticateArgs {
    #[arg(long)]
    pub device: String,

    /// Challenge string to sign.
    #[arg(long)]
    pub challenge: String,
}

#[derive(Parser, Debug)]
pub struct SignMomentArgs {
    /// did:key of the other participant.
    #[arg(long)]
    pub subject: String,

    #[arg(long)]
    pub description: String,
}

#[derive(Parser, Debug)]
pub struct VerifyMomentArgs {
    /// Moment JSON.
    pub moment: String,

    /// Also require the timestamp to be within tolerance of now.
    #[arg(long)]
    pub fresh: bool,
}

#[derive(Parser, Debug)]
pub struct ThresholdsArgs {
    pub count: u64,
}

#[derive(Parser, Debug)]
pub struct ProveArgs {
    /// JSON file holding an array of moments.
    #[arg(long)]
    pub moments: PathBuf,

    #[arg(long)]
    pub threshold: u64,

    /// Only count moments whose signature verifies.
    #[arg(long)]
    pub verified_only: bool,
}

#[derive(Parser, Debug)]
pub struct VerifyProofArgs {
    /// Proof JSON.
    pub proof: String,
}

#[derive(Parser, Debug)]
pub struct ProvisionArgs {
    #[arg(long)]
    pub name: String,

    #[arg(long = "type", default_value = "passive")]
    pub device_type: String,

    #[arg(long)]
    pub uid: String,

    /// Chip class: ultra-small, medium, large or secure.
    #[arg(long)]
    pub chip: Option<String>,
}

#[derive(Parser, Debug)]
pub struct EncodeTagArgs {
    #[arg(long)]
    pub device: String,

    #[arg(long, default_value = "medium")]
    pub chip: String,
}

#[derive(Parser, Debug)]
pub struct DecodeTagArgs {
    /// Tag URL, or hex NDEF bytes with --ndef.
    pub input: String,

    /// Treat the input as hex-encoded NDEF bytes.
    #[arg(long)]
    pub ndef: bool,

    /// UID reported by the reader, to check the tag is on its own chip.
    #[arg(long)]
    pub uid: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        MeldNodeCli::command().debug_assert();
    }

    #[test]
    fn global_args_after_subcommand() {
        let cli = MeldNodeCli::try_parse_from([
            "meld-node",
            "register",
            "--name",
            "tag1",
            "--data-dir",
            "/tmp/meld",
        ])
        .unwrap();
        assert_eq!(cli.global.data_dir, PathBuf::from("/tmp/meld"));
        match cli.command {
            Commands::Register(args) => {
                assert_eq!(args.name, "tag1");
                assert_eq!(args.device_type, "passive");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
