use tokio::runtime;

use std::env;
use std::process;

use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use s3manifest::config::{
    BUCKET_VAR, LOCAL_POLICY_VAR, LOCAL_PREFIX_VAR, MAX_CONCURRENT_VAR, REMOTE_PREFIX_VAR,
};
use s3manifest::{artifact, Error, Manifest, ManifestConfiguration};

// Command line flags standing in for the environment variable of the same setting.
const FLAG_VARS: &[(&str, &str)] = &[
    ("bucket", BUCKET_VAR),
    ("remote_prefix", REMOTE_PREFIX_VAR),
    ("local_prefix", LOCAL_PREFIX_VAR),
    ("local_policy", LOCAL_POLICY_VAR),
    ("max_concurrent", MAX_CONCURRENT_VAR),
];

fn transfer_args<'a, 'b>(with_policy: bool) -> Vec<Arg<'a, 'b>> {
    let mut args = vec![
        Arg::with_name("bucket")
            .short("b")
            .long("bucket")
            .value_name("NAME")
            .help("Sets the S3 bucket [env: S3_BUCKET]")
            .takes_value(true),
        Arg::with_name("remote_prefix")
            .short("r")
            .long("remote-prefix")
            .value_name("PREFIX")
            .help("Sets the prefix of object keys [env: S3_ARTIFACT_PREFIX]")
            .takes_value(true),
        Arg::with_name("local_prefix")
            .short("l")
            .long("local-prefix")
            .value_name("DIR")
            .help("Sets the base directory of local paths [env: ARTIFACT_LOCAL_PREFIX]")
            .takes_value(true),
        Arg::with_name("max_concurrent")
            .short("F")
            .long("max-concurrent")
            .value_name("NUM")
            .help("Sets the number of concurrent transfers [env: ARTIFACT_MAX_CONCURRENT]")
            .takes_value(true),
        Arg::with_name("sequential")
            .long("sequential")
            .help("Transfers one artifact at a time, in manifest order"),
        Arg::with_name("MANIFEST")
            .help("Sets the artifact list (name<TAB>path per line)")
            .required(true)
            .index(1),
    ];
    if with_policy {
        args.push(
            Arg::with_name("local_policy")
                .short("p")
                .long("local-policy")
                .value_name("POLICY")
                .possible_values(&["overwrite", "skip"])
                .help("Sets what to do with existing local files [env: ARTIFACT_LOCAL_POLICY]")
                .takes_value(true),
        );
    }
    args
}

fn args() -> ArgMatches<'static> {
    App::new("s3manifest")
        .about("Syncs a manifest of named artifacts with an S3 bucket")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("directory")
                .short("C")
                .long("directory")
                .value_name("DIR")
                .help("Sets the current directory")
                .takes_value(true),
        )
        .subcommand(
            SubCommand::with_name("get")
                .about("Downloads every artifact to its local path")
                .args(&transfer_args(true)),
        )
        .subcommand(
            SubCommand::with_name("store")
                .about("Uploads every artifact from its local path")
                .args(&transfer_args(false)),
        )
        .get_matches()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let matches = args();

    if let Some(cwd) = matches.value_of_os("directory") {
        env::set_current_dir(cwd).expect("failed to change current dir");
    }

    let rt = runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .expect("failed to create Runtime");

    let result = match matches.subcommand() {
        ("get", Some(sub_matches)) => rt.block_on(execute_get(sub_matches)),
        ("store", Some(sub_matches)) => rt.block_on(execute_store(sub_matches)),
        _ => unreachable!("subcommand is required"),
    };
    if let Err(e) = result {
        error!("{}", e);
        process::exit(1);
    }
}

async fn execute_get(sub_matches: &ArgMatches<'_>) -> Result<(), Error> {
    let manifest = build_manifest(sub_matches).await?;
    if sub_matches.is_present("sequential") {
        let store = s3manifest::S3Store::from_config(manifest.config());
        manifest.get_sequential_with(&store).await?;
    } else {
        manifest.get().await?;
    }
    Ok(())
}

async fn execute_store(sub_matches: &ArgMatches<'_>) -> Result<(), Error> {
    let manifest = build_manifest(sub_matches).await?;
    if sub_matches.is_present("sequential") {
        let store = s3manifest::S3Store::from_config(manifest.config());
        manifest.store_sequential_with(&store).await?;
    } else {
        manifest.store().await?;
    }
    Ok(())
}

async fn build_manifest(sub_matches: &ArgMatches<'_>) -> Result<Manifest, Error> {
    let config = ManifestConfiguration::from_lookup(|name| {
        FLAG_VARS
            .iter()
            .find(|(_, var)| *var == name)
            .and_then(|(flag, _)| sub_matches.value_of(flag))
            .map(ToOwned::to_owned)
            .or_else(|| env::var(name).ok())
    })?;
    let list = sub_matches
        .value_of_os("MANIFEST")
        .ok_or("no manifest given")?;
    let artifacts = artifact::read_list(list).await?;
    Ok(Manifest::new(config, artifacts))
}
