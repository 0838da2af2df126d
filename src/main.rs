mod model_io;

use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{self, bail, Context};
use indicatif::{ProgressBar, ProgressStyle};

use pa_toolchain::config::{derapify_bytes, to_text, FilesystemResolver, Preprocessor};
use pa_toolchain::error::Diagnostics;
use pa_toolchain::pa::{unpack_to_dir, EntryFilter, FileProducer, PaReader, PaWriter};
use pa_toolchain::settings::Settings;
use pa_toolchain::sign::{default_signature_path, sign_archive, PrivateKey, SignatureVersion};

#[derive(Debug, Parser)]
#[command(name = "pa-toolchain")]
struct Cli {
    /// Increase log verbosity (repeatable).
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Path to the toolchain's own TOML settings file (distinct from the
    /// game's config language); merged with per-subcommand flags, which
    /// take precedence.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Suppresses a named diagnostic kind (repeatable); see
    /// `DiagnosticKind::from_name` for the recognized spellings.
    #[arg(long = "warning", global = true)]
    warnings: Vec<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Converts an MLOD source model into an ODOL binary.
    Binarize {
        src: PathBuf,
        dst: Option<PathBuf>,
        #[arg(long)]
        force: bool,
    },
    /// Runs the macro preprocessor over a config source file.
    Preprocess { src: PathBuf, dst: PathBuf },
    /// Decodes a rapified config binary back to text.
    Derapify { src: Option<PathBuf>, dst: Option<PathBuf> },
    /// Packs a source directory into a package archive.
    Build {
        srcdir: PathBuf,
        dstfile: PathBuf,
        #[arg(long)]
        exclude: Vec<String>,
        #[arg(long)]
        privatekey: Option<PathBuf>,
        #[arg(long)]
        signature: Option<PathBuf>,
    },
    /// Lists a package archive's properties and entries.
    Inspect { pafile: PathBuf },
    /// Extracts every entry from a package archive.
    Unpack {
        pafile: PathBuf,
        dstdir: PathBuf,
        #[arg(long)]
        include: Vec<String>,
        #[arg(long)]
        exclude: Vec<String>,
        #[arg(long)]
        force: bool,
    },
    /// Prints one entry's bytes from a package archive to stdout.
    Cat { pafile: PathBuf, entry: String },
    /// Produces a detached signature for a package archive.
    Sign {
        pafile: PathBuf,
        key: PathBuf,
        #[arg(long)]
        signature: Option<PathBuf>,
        #[arg(long, default_value_t = 3)]
        version: u32,
    },
    /// Converts an image into the engine's texture container format.
    Img2paa { src: PathBuf, dst: PathBuf },
    /// Converts the engine's texture container format into a plain image.
    Paa2img { src: PathBuf, dst: PathBuf },
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::builder().filter_level(level).init();

    let settings = match &cli.config {
        Some(path) => Settings::from_toml_file(path).wrap_err("loading --config")?,
        None => Settings::default(),
    };
    let mut diagnostics = Diagnostics::new();
    diagnostics.mute_by_name(settings.muted_warnings.iter().map(String::as_str));
    diagnostics.mute_by_name(cli.warnings.iter().map(String::as_str));

    let result = match cli.command {
        Command::Binarize { src, dst, force } => cmd_binarize(&src, dst.as_deref(), force || settings.force),
        Command::Preprocess { src, dst } => cmd_preprocess(&src, &dst, &settings, &mut diagnostics),
        Command::Derapify { src, dst } => cmd_derapify(src.as_deref(), dst.as_deref()),
        Command::Build { srcdir, dstfile, exclude, privatekey, signature } => {
            let privatekey = privatekey.or(settings.privatekey.clone());
            let signature = signature.or(settings.signature.clone());
            cmd_build(&srcdir, &dstfile, &exclude, &settings, privatekey.as_deref(), signature.as_deref())
        }
        Command::Inspect { pafile } => cmd_inspect(&pafile),
        Command::Unpack { pafile, dstdir, include, exclude, force } => {
            cmd_unpack(&pafile, &dstdir, &include, &exclude, force || settings.force, &settings)
        }
        Command::Cat { pafile, entry } => cmd_cat(&pafile, &entry),
        Command::Sign { pafile, key, signature, version } => cmd_sign(&pafile, &key, signature.as_deref(), version),
        Command::Img2paa { .. } | Command::Paa2img { .. } => {
            eprintln!("the image codec is a separate vendor tool and is not implemented in this build");
            std::process::exit(1);
        }
    };

    if let Err(err) = &result {
        log::error!("{err:#}");
    }
    result
}

/// The preprocessor's `#include` search honors `NATIVEBIN`/`BIOUTPUT` only
/// insofar as the filesystem resolver's extra search roots; the vendor
/// binarizer and image codec those variables otherwise steer are external
/// collaborators this crate does not launch (spec §6.3).
fn extra_include_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Ok(native_bin) = std::env::var("NATIVEBIN") {
        roots.push(PathBuf::from(native_bin));
    }
    roots
}

fn cmd_preprocess(
    src: &std::path::Path,
    dst: &std::path::Path,
    settings: &Settings,
    diagnostics: &mut Diagnostics,
) -> eyre::Result<()> {
    let source_text = fs::read_to_string(src).wrap_err_with(|| format!("reading {src:?}"))?;
    let logical = src.to_string_lossy().replace('/', "\\");
    let mut roots = vec![src.parent().unwrap_or(std::path::Path::new(".")).to_path_buf()];
    roots.extend(settings.include_roots.clone());
    roots.extend(extra_include_roots());
    let resolver = FilesystemResolver::new(roots);
    let output = Preprocessor::new(&resolver)
        .preserve_lines(settings.preserve_lines)
        .preprocess(&logical, &source_text, diagnostics)
        .wrap_err("preprocessing failed")?;
    fs::write(dst, output.text).wrap_err_with(|| format!("writing {dst:?}"))?;
    Ok(())
}

fn cmd_binarize(src: &std::path::Path, dst: Option<&std::path::Path>, force: bool) -> eyre::Result<()> {
    let default_dst;
    let dst = match dst {
        Some(d) => d,
        None => {
            default_dst = src.with_extension("odol");
            &default_dst
        }
    };
    if dst.exists() && !force {
        bail!("output {dst:?} already exists; pass --force to overwrite");
    }
    model_io::binarize(src, dst)
}

fn cmd_derapify(src: Option<&std::path::Path>, dst: Option<&std::path::Path>) -> eyre::Result<()> {
    let bytes = match src {
        Some(path) => fs::read(path).wrap_err_with(|| format!("reading {path:?}"))?,
        None => {
            use std::io::Read;
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            buf
        }
    };
    let config = derapify_bytes(&bytes)?;
    let text = to_text(&config);
    match dst {
        Some(path) => fs::write(path, text).wrap_err_with(|| format!("writing {path:?}"))?,
        None => print!("{text}"),
    }
    Ok(())
}

fn cmd_build(
    srcdir: &std::path::Path,
    dstfile: &std::path::Path,
    exclude: &[String],
    settings: &Settings,
    privatekey: Option<&std::path::Path>,
    signature: Option<&std::path::Path>,
) -> eyre::Result<()> {
    let mut filter = EntryFilter::new();
    for glob in exclude.iter().chain(settings.exclude_globs.iter()) {
        filter = filter.exclude(glob.clone());
    }

    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::default_spinner().template("{spinner} packing {msg}")?);

    let mut writer = PaWriter::new();
    if let Ok(prefix) = fs::read_to_string(srcdir.join("$PBOPREFIX$")) {
        writer.set_property("prefix", prefix.trim());
    }

    for entry in walk_files(srcdir)? {
        let relative = entry
            .strip_prefix(srcdir)
            .unwrap()
            .to_string_lossy()
            .replace(std::path::MAIN_SEPARATOR, "\\");
        if !filter.keep(&relative) {
            continue;
        }
        bar.set_message(relative.clone());
        bar.tick();
        writer.add_entry(FileProducer::from_path(relative, entry)?);
    }
    bar.finish_and_clear();

    let mut out = fs::File::create(dstfile).wrap_err_with(|| format!("creating {dstfile:?}"))?;
    writer.write(&mut out)?;
    drop(out);

    if let Some(key_path) = privatekey {
        let file = fs::File::open(dstfile)?;
        let reader = PaReader::open(file)?;
        let key = PrivateKey::load(key_path)?;
        let sig = sign_archive(&reader, &key, SignatureVersion::V3)?;
        let sig_path = signature
            .map(PathBuf::from)
            .unwrap_or_else(|| default_signature_path(dstfile, key_path));
        let mut sig_file = fs::File::create(&sig_path)?;
        sig.write(&mut sig_file)?;
    }
    Ok(())
}

fn walk_files(root: &std::path::Path) -> eyre::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.file_name().is_some_and(|n| n != "$PBOPREFIX$") {
                out.push(path);
            }
        }
    }
    Ok(out)
}

fn cmd_inspect(pafile: &std::path::Path) -> eyre::Result<()> {
    let file = fs::File::open(pafile).wrap_err_with(|| format!("opening {pafile:?}"))?;
    let reader = PaReader::open(file)?;
    for (key, value) in reader.properties() {
        println!("{key}={value}");
    }
    for entry in reader.entries() {
        println!("{}\t{}", entry.name, entry.data_size);
    }
    Ok(())
}

fn cmd_unpack(
    pafile: &std::path::Path,
    dstdir: &std::path::Path,
    include: &[String],
    exclude: &[String],
    force: bool,
    settings: &Settings,
) -> eyre::Result<()> {
    let file = fs::File::open(pafile).wrap_err_with(|| format!("opening {pafile:?}"))?;
    let reader = PaReader::open(file)?;
    let mut filter = EntryFilter::new();
    for glob in exclude.iter().chain(settings.exclude_globs.iter()) {
        filter = filter.exclude(glob.clone());
    }
    for glob in include.iter().chain(settings.include_globs.iter()) {
        filter = filter.include(glob.clone());
    }
    let count = unpack_to_dir(&reader, dstdir, &filter, force)?;
    println!("extracted {count} entries");
    Ok(())
}

fn cmd_cat(pafile: &std::path::Path, entry: &str) -> eyre::Result<()> {
    use std::io::Write;
    let file = fs::File::open(pafile).wrap_err_with(|| format!("opening {pafile:?}"))?;
    let reader = PaReader::open(file)?;
    let bytes = reader.read_entry_to_vec(entry)?;
    std::io::stdout().write_all(&bytes)?;
    Ok(())
}

fn cmd_sign(pafile: &std::path::Path, key: &std::path::Path, signature: Option<&std::path::Path>, version: u32) -> eyre::Result<()> {
    let file = fs::File::open(pafile).wrap_err_with(|| format!("opening {pafile:?}"))?;
    let reader = PaReader::open(file)?;
    let priv_key = PrivateKey::load(key)?;
    let version = match version {
        2 => SignatureVersion::V2,
        _ => SignatureVersion::V3,
    };
    let sig = sign_archive(&reader, &priv_key, version)?;
    let sig_path = signature.map(PathBuf::from).unwrap_or_else(|| default_signature_path(pafile, key));
    let mut sig_file = fs::File::create(&sig_path).wrap_err_with(|| format!("creating {sig_path:?}"))?;
    sig.write(&mut sig_file)?;
    println!("wrote {sig_path:?}");
    Ok(())
}
