//! Key generation tool for the Murmur membership circuit.
//!
//! Performs the circuit-specific Groth16 setup and writes the proving
//! and verifying keys as artifacts, plus a BLAKE3 checksum of the VK
//! so clients can pin the key they fetch.
//!
//! Usage:
//!   cargo run --bin murmur-keygen -- generate --output ./artifacts
//!   cargo run --bin murmur-keygen -- verify --vk ./artifacts/membership.vk.bin

use ark_bn254::Bn254;
use ark_groth16::Groth16;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::SNARK;
use ark_std::rand::thread_rng;
use clap::{Parser, Subcommand};
use murmur_crypto::circuit::MembershipCircuit;
use murmur_crypto::merkle::DEFAULT_TREE_DEPTH;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const CIRCUIT_VERSION: &str = "1.0.0";

/// Groth16 key generation for Murmur membership proofs.
#[derive(Parser)]
#[command(name = "murmur-keygen")]
#[command(about = "Generate Groth16 proving and verifying keys for the membership circuit")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate new proving and verifying keys.
    Generate {
        /// Output directory for key artifacts.
        #[arg(short, long, default_value = "./artifacts")]
        output: PathBuf,

        /// Merkle tree depth the circuit is fixed to.
        #[arg(short, long, default_value_t = DEFAULT_TREE_DEPTH)]
        depth: usize,
    },

    /// Verify that a verifying key deserializes and matches a checksum.
    Verify {
        /// Path to verifying key file.
        #[arg(short, long)]
        vk: PathBuf,

        /// Expected VK checksum (hex).
        #[arg(short, long)]
        expected_hash: Option<String>,
    },

    /// Show information about existing key artifacts.
    Info {
        /// Directory containing key artifacts.
        #[arg(short, long, default_value = "./artifacts")]
        artifacts_dir: PathBuf,
    },
}

fn checksum(bytes: &[u8]) -> String {
    hex::encode(blake3::hash(bytes).as_bytes())
}

fn generate_keys(output_dir: &Path, depth: usize) -> Result<(), Box<dyn std::error::Error>> {
    println!("Murmur key generator v{}", CIRCUIT_VERSION);
    println!("Circuit: membership (depth {})", depth);
    println!();

    fs::create_dir_all(output_dir)?;

    println!("Running circuit-specific trusted setup...");
    println!("This may take several minutes.");
    let mut rng = thread_rng();
    let circuit = MembershipCircuit::empty(depth);
    let (pk, vk) = Groth16::<Bn254>::circuit_specific_setup(circuit, &mut rng)?;
    println!("Setup complete.");
    println!();

    let pk_path = output_dir.join("membership.pk.bin");
    let mut pk_bytes = Vec::new();
    pk.serialize_compressed(&mut pk_bytes)?;
    File::create(&pk_path)?.write_all(&pk_bytes)?;
    println!("Proving key:   {} ({} bytes)", pk_path.display(), pk_bytes.len());

    let vk_path = output_dir.join("membership.vk.bin");
    let mut vk_bytes = Vec::new();
    vk.serialize_compressed(&mut vk_bytes)?;
    File::create(&vk_path)?.write_all(&vk_bytes)?;
    println!("Verifying key: {} ({} bytes)", vk_path.display(), vk_bytes.len());

    let vk_hash = checksum(&vk_bytes);
    let hash_path = output_dir.join("membership.vk.hash");
    writeln!(File::create(&hash_path)?, "{}", vk_hash)?;
    println!("VK checksum:   {}", vk_hash);

    let meta_path = output_dir.join("membership.meta.json");
    let metadata = serde_json::json!({
        "circuit": "membership",
        "version": CIRCUIT_VERSION,
        "tree_depth": depth,
        "vk_hash": vk_hash,
        "pk_size": pk_bytes.len(),
        "vk_size": vk_bytes.len(),
        "generated_at": chrono::Utc::now().to_rfc3339(),
    });
    serde_json::to_writer_pretty(&mut File::create(&meta_path)?, &metadata)?;
    println!("Metadata:      {}", meta_path.display());

    println!();
    println!("Key generation complete.");
    println!("Serve membership.pk.bin and membership.vk.bin from the artifact");
    println!("endpoint, and pin the VK checksum in daemon configuration.");

    Ok(())
}

fn verify_key(
    vk_path: &Path,
    expected_hash: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying key: {}", vk_path.display());

    let mut vk_bytes = Vec::new();
    File::open(vk_path)?.read_to_end(&mut vk_bytes)?;

    let actual_hash = checksum(&vk_bytes);
    println!("Checksum: {}", actual_hash);
    println!("Size:     {} bytes", vk_bytes.len());

    let _vk = ark_groth16::VerifyingKey::<Bn254>::deserialize_compressed(&vk_bytes[..])?;
    println!("Deserialization: OK");

    if let Some(expected) = expected_hash {
        if actual_hash == expected {
            println!("Checksum match: OK");
        } else {
            eprintln!("Checksum MISMATCH!");
            eprintln!("  Expected: {}", expected);
            eprintln!("  Actual:   {}", actual_hash);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn show_info(artifacts_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Murmur key artifacts");
    println!("Directory: {}", artifacts_dir.display());
    println!();

    let meta_path = artifacts_dir.join("membership.meta.json");
    if meta_path.exists() {
        let metadata: serde_json::Value = serde_json::from_str(&fs::read_to_string(&meta_path)?)?;
        println!("Membership circuit:");
        println!("  Version:     {}", metadata["version"]);
        println!("  Tree depth:  {}", metadata["tree_depth"]);
        println!("  VK checksum: {}", metadata["vk_hash"]);
        println!("  PK size:     {} bytes", metadata["pk_size"]);
        println!("  VK size:     {} bytes", metadata["vk_size"]);
        println!("  Generated:   {}", metadata["generated_at"]);
    } else {
        println!("No key artifacts found. Run 'murmur-keygen generate' first.");
    }

    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate { output, depth } => generate_keys(&output, depth)?,
        Commands::Verify { vk, expected_hash } => verify_key(&vk, expected_hash)?,
        Commands::Info { artifacts_dir } => show_info(&artifacts_dir)?,
    }

    Ok(())
}
