#![forbid(unsafe_code)]

//! domsig CLI: create and verify XML Signatures.

use base64::Engine;
use domsig_c14n::C14nMode;
use domsig_core::{algorithm, Error};
use domsig_crypto::{DigestMethod, KeyFamily, SignatureMethod};
use domsig_dsig::{
    DsigConfig, DsigContext, KeyInfo, KeySelector, KeyValueSelector, ObjectContent, Reference,
    SignatureTarget, SignedInfo, SingleKeySelector, XmlObject, XmlSignature,
};
use domsig_keys::loader::{load_hmac_key_file, load_key_file};
use domsig_keys::{Key, KeysManager};
use domsig_transforms::{CanonicalizationMethod, Transform};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

/// Id given to the Object that carries enveloped content.
const OBJECT_ID: &str = "object";

#[derive(Parser)]
#[command(
    name = "domsig",
    about = "domsig: DOM-based W3C XML Signature (XML-DSig)",
    version
)]
struct Cli {
    /// Log pipeline steps (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign a document
    Sign {
        /// Input file
        file: PathBuf,

        /// Wrap the input in an Object inside the Signature instead of
        /// appending the Signature to the document
        #[arg(long)]
        enveloping: bool,

        /// Load private key (PEM or DER, auto-detected)
        #[arg(short = 'k', long)]
        key: Option<PathBuf>,

        /// Load raw HMAC key (binary file)
        #[arg(long = "hmac-key")]
        hmac_key: Option<PathBuf>,

        /// Reference URI (default: "" enveloped, "#object" enveloping)
        #[arg(long)]
        uri: Option<String>,

        /// Digest algorithm, by name or URI
        #[arg(long, default_value = "sha256")]
        digest: String,

        /// Signature algorithm, by name or URI (default: from the key)
        #[arg(long)]
        method: Option<String>,

        /// Canonicalization algorithm, by name or URI
        #[arg(long, default_value = "exc-c14n")]
        c14n: String,

        /// ID of the element to append the Signature to (default: root)
        #[arg(long = "parent-id")]
        parent_id: Option<String>,

        /// Embed the public key as a KeyValue
        #[arg(long = "key-value")]
        key_value: bool,

        /// Register additional ID attribute names
        #[arg(long = "id-attr")]
        id_attr: Vec<String>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Verify a signed document
    Verify {
        /// Input XML file
        file: PathBuf,

        /// Load public or private key (PEM or DER, auto-detected)
        #[arg(short = 'k', long)]
        key: Option<PathBuf>,

        /// Load key with a name (NAME:FILE)
        #[arg(short = 'K', long = "key-name")]
        key_name: Vec<String>,

        /// Load raw HMAC key (binary file)
        #[arg(long = "hmac-key")]
        hmac_key: Option<PathBuf>,

        /// Register additional ID attribute names
        #[arg(long = "id-attr")]
        id_attr: Vec<String>,

        /// Also check the references of every Manifest
        #[arg(long = "validate-manifests")]
        validate_manifests: bool,

        /// Turn off secure validation limits
        #[arg(long)]
        insecure: bool,
    },

    /// List supported algorithms
    Info,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Sign {
            file,
            enveloping,
            key,
            hmac_key,
            uri,
            digest,
            method,
            c14n,
            parent_id,
            key_value,
            id_attr,
            output,
        } => cmd_sign(SignArgs {
            file,
            enveloping,
            key,
            hmac_key,
            uri,
            digest,
            method,
            c14n,
            parent_id,
            key_value,
            id_attr,
            output,
        }),

        Commands::Verify {
            file,
            key,
            key_name,
            hmac_key,
            id_attr,
            validate_manifests,
            insecure,
        } => cmd_verify(
            file,
            key,
            key_name,
            hmac_key,
            id_attr,
            validate_manifests,
            insecure,
        ),

        Commands::Info => cmd_info(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// ── sign ─────────────────────────────────────────────────────────────

struct SignArgs {
    file: PathBuf,
    enveloping: bool,
    key: Option<PathBuf>,
    hmac_key: Option<PathBuf>,
    uri: Option<String>,
    digest: String,
    method: Option<String>,
    c14n: String,
    parent_id: Option<String>,
    key_value: bool,
    id_attr: Vec<String>,
    output: Option<PathBuf>,
}

fn cmd_sign(args: SignArgs) -> Result<(), Error> {
    let input = read_file(&args.file)?;
    let key = match (&args.key, &args.hmac_key) {
        (Some(path), None) => load_key_file(path)?,
        (None, Some(path)) => load_hmac_key_file(path)?,
        _ => return Err(Error::Other("sign needs exactly one of --key or --hmac-key".into())),
    };
    let method = match &args.method {
        Some(name) => parse_signature_method(name)?,
        None => default_method(&key),
    };
    let digest = parse_digest(&args.digest)?;
    let mode = parse_c14n(&args.c14n)?;

    let (target, reference, object) = if args.enveloping {
        let uri = args.uri.unwrap_or_else(|| format!("#{OBJECT_ID}"));
        let (object, transform) = enveloping_object(&input, mode)?;
        let reference = Reference::new(uri, digest).with_transform(transform);
        (SignatureTarget::Enveloping, reference, Some(object))
    } else {
        let uri = args.uri.unwrap_or_default();
        let mut reference = Reference::new(uri.as_str(), digest);
        if uri.is_empty() {
            reference = reference.with_transform(Transform::EnvelopedSignature);
        }
        if uri.is_empty() || uri.starts_with('#') {
            reference = reference.with_transform(Transform::c14n(mode));
        }
        let target = SignatureTarget::Enveloped {
            document: input,
            parent_id: args.parent_id,
        };
        (target, reference, None)
    };

    let signed_info = SignedInfo::new(CanonicalizationMethod::new(mode), method, vec![reference])?;
    let mut signature = XmlSignature::new(signed_info);
    if args.key_value && !method.is_hmac() {
        signature = signature.with_key_info(KeyInfo::new().with_key_value(&key));
    }
    if let Some(object) = object {
        signature = signature.with_object(object);
    }

    let mut ctx = DsigContext::new(SingleKeySelector(key)).with_config(DsigConfig::from_env()?);
    for attr in &args.id_attr {
        ctx.add_id_attr(attr);
    }

    tracing::debug!(file = %args.file.display(), method = method.uri(), "signing");
    let signed = signature.sign(&ctx, &target)?;
    write_output(args.output, signed.as_bytes())
}

/// XML input goes in as markup; anything else is carried base64-encoded.
fn enveloping_object(input: &str, mode: C14nMode) -> Result<(XmlObject, Transform), Error> {
    let object = XmlObject::new().with_id(OBJECT_ID);
    if let Ok(doc) = domsig_xml::parse(input) {
        let root = &input[doc.root_element().range()];
        let object = object.with_content(ObjectContent::Raw(root.to_owned()));
        return Ok((object, Transform::c14n(mode)));
    }
    let encoded = base64::engine::general_purpose::STANDARD.encode(input.as_bytes());
    let object = object
        .with_encoding(algorithm::BASE64)
        .with_content(ObjectContent::Raw(encoded));
    Ok((object, Transform::Base64))
}

fn default_method(key: &Key) -> SignatureMethod {
    match key.family() {
        KeyFamily::Rsa => SignatureMethod::RsaSha256,
        KeyFamily::Dsa if key.key_size_bits() <= 1024 => SignatureMethod::DsaSha1,
        KeyFamily::Dsa => SignatureMethod::DsaSha256,
        KeyFamily::Ecdsa => SignatureMethod::EcdsaSha256,
        KeyFamily::Hmac => SignatureMethod::HmacSha256,
    }
}

// ── verify ───────────────────────────────────────────────────────────

fn cmd_verify(
    file: PathBuf,
    key: Option<PathBuf>,
    key_name: Vec<String>,
    hmac_key: Option<PathBuf>,
    id_attr: Vec<String>,
    validate_manifests: bool,
    insecure: bool,
) -> Result<(), Error> {
    let xml = read_file(&file)?;
    let mgr = build_keys_manager(key, key_name, hmac_key)?;
    let selector: Box<dyn KeySelector> = if mgr.is_empty() {
        tracing::warn!("no keys loaded; trusting the KeyValue in the document");
        Box::new(KeyValueSelector)
    } else {
        Box::new(mgr)
    };

    let mut config = DsigConfig::from_env()?;
    config.validate_manifests |= validate_manifests;
    if insecure {
        config.secure_validation = false;
    }
    let mut ctx = DsigContext::new(vec![selector]).with_config(config);
    for attr in &id_attr {
        ctx.add_id_attr(attr);
    }

    tracing::debug!(file = %file.display(), "verifying");
    let mut signature = XmlSignature::parse(&xml, &ctx)?;
    if signature.validate(&ctx)? {
        println!("OK");
        Ok(())
    } else {
        for (i, reference) in signature.signed_info.references.iter().enumerate() {
            if reference.validation_status() == Some(false) {
                eprintln!("Reference {} ({:?}) digest mismatch", i + 1, reference.uri);
            }
        }
        println!("INVALID");
        process::exit(1);
    }
}

fn build_keys_manager(
    key_path: Option<PathBuf>,
    key_names: Vec<String>,
    hmac_key_path: Option<PathBuf>,
) -> Result<KeysManager, Error> {
    let mut mgr = KeysManager::new();

    if let Some(path) = key_path {
        mgr.add_key(load_key_file(&path)?);
    }

    // NAME:FILE
    for spec in &key_names {
        let (name, file) = spec.split_once(':').ok_or_else(|| {
            Error::Other(format!("invalid key-name format: {spec} (expected NAME:FILE)"))
        })?;
        let key = load_key_file(&PathBuf::from(file))?.with_name(name);
        mgr.add_key(key);
    }

    if let Some(path) = hmac_key_path {
        mgr.add_key(load_hmac_key_file(&path)?);
    }

    Ok(mgr)
}

// ── info ─────────────────────────────────────────────────────────────

fn cmd_info() -> Result<(), Error> {
    println!("domsig: DOM-based W3C XML Signature");
    println!();
    println!("Digest algorithms:");
    for d in DigestMethod::all() {
        println!("  {:<10} {}", d.native_name, d.uri);
    }
    println!();
    println!("Signature algorithms:");
    for s in SignatureMethod::all() {
        println!("  {:<16} {}", s.native_name, s.uri);
    }
    println!();
    println!("Canonicalization:");
    for (name, mode) in C14N_NAMES {
        println!("  {:<18} {}", name, mode.uri());
    }
    println!();
    println!("Transforms:");
    for uri in [
        algorithm::ENVELOPED_SIGNATURE,
        algorithm::BASE64,
        algorithm::XPATH,
        algorithm::XPATH2,
        algorithm::XSLT,
    ] {
        println!("  {uri}");
    }
    println!();
    println!("Key formats:");
    println!("  PEM, DER (RSA, DSA, EC P-256/P-384), raw binary (HMAC)");
    Ok(())
}

// ── Algorithm names ──────────────────────────────────────────────────

const C14N_NAMES: [(&str, C14nMode); 6] = [
    ("c14n", C14nMode::Inclusive),
    ("c14n-comments", C14nMode::InclusiveWithComments),
    ("c14n11", C14nMode::Inclusive11),
    ("c14n11-comments", C14nMode::Inclusive11WithComments),
    ("exc-c14n", C14nMode::Exclusive),
    ("exc-c14n-comments", C14nMode::ExclusiveWithComments),
];

/// Lowercase with `-` and `_` removed, so `SHA-256` matches `sha256`.
fn fold(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '-' && *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn parse_digest(name: &str) -> Result<DigestMethod, Error> {
    if name.contains("://") {
        return DigestMethod::from_uri(name);
    }
    DigestMethod::all()
        .iter()
        .find(|d| fold(d.native_name) == fold(name))
        .map(|d| d.method)
        .ok_or_else(|| Error::UnsupportedAlgorithm(format!("digest algorithm: {name}")))
}

fn parse_signature_method(name: &str) -> Result<SignatureMethod, Error> {
    if name.contains("://") {
        return SignatureMethod::from_uri(name);
    }
    SignatureMethod::all()
        .iter()
        .find(|s| fold(s.native_name) == fold(name) || s.uri.ends_with(&format!("#{name}")))
        .map(|s| s.method)
        .ok_or_else(|| Error::UnsupportedAlgorithm(format!("signature algorithm: {name}")))
}

fn parse_c14n(name: &str) -> Result<C14nMode, Error> {
    if let Some(mode) = C14nMode::from_uri(name) {
        return Ok(mode);
    }
    C14N_NAMES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, mode)| *mode)
        .ok_or_else(|| Error::UnsupportedAlgorithm(format!("canonicalization: {name}")))
}

// ── Utility functions ────────────────────────────────────────────────

fn read_file(path: &PathBuf) -> Result<String, Error> {
    std::fs::read_to_string(path).map_err(|e| Error::Other(format!("{}: {e}", path.display())))
}

fn write_output(path: Option<PathBuf>, data: &[u8]) -> Result<(), Error> {
    match path {
        Some(p) => {
            std::fs::write(&p, data).map_err(|e| Error::Other(format!("{}: {e}", p.display())))
        }
        None => {
            use std::io::Write;
            std::io::stdout()
                .write_all(data)
                .map_err(|e| Error::Other(format!("stdout: {e}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_names() {
        assert_eq!(parse_digest("SHA-256").unwrap(), DigestMethod::Sha256);
        assert_eq!(parse_digest("sha3_512").unwrap(), DigestMethod::Sha3_512);
        assert_eq!(parse_digest(algorithm::SHA1).unwrap(), DigestMethod::Sha1);
        assert!(parse_digest("sha0").is_err());

        assert_eq!(
            parse_signature_method("rsa-sha256").unwrap(),
            SignatureMethod::RsaSha256
        );
        assert_eq!(
            parse_signature_method("HmacSHA512").unwrap(),
            SignatureMethod::HmacSha512
        );
        assert_eq!(
            parse_signature_method(algorithm::ECDSA_SHA384).unwrap(),
            SignatureMethod::EcdsaSha384
        );

        assert_eq!(parse_c14n("exc-c14n").unwrap(), C14nMode::Exclusive);
        assert_eq!(parse_c14n(algorithm::C14N11).unwrap(), C14nMode::Inclusive11);
        assert!(parse_c14n("c14n2").is_err());
    }

    #[test]
    fn test_enveloping_object_kinds() {
        let (object, transform) =
            enveloping_object("<?xml version=\"1.0\"?>\n<a>1</a>", C14nMode::Exclusive).unwrap();
        assert!(matches!(&object.content[0], ObjectContent::Raw(s) if s == "<a>1</a>"));
        assert_eq!(transform.algorithm(), algorithm::EXC_C14N);

        let (object, transform) = enveloping_object("plain text", C14nMode::Exclusive).unwrap();
        assert_eq!(object.encoding.as_deref(), Some(algorithm::BASE64));
        assert!(matches!(transform, Transform::Base64));
    }
}
