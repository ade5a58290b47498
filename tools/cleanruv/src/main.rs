#![warn(unused_extern_crates)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::unreachable)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::trivially_copy_pass_by_ref)]
// We allow expect since it forces good error messages at the least.
#![allow(clippy::expect_used)]

use std::process::ExitCode;

use clap::Parser;
use tokio::runtime;
use tracing::{debug, error};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use cleanruv::config::{default_host, Config, Settings};
use cleanruv::ldap::LdapClient;
use cleanruv::operator::TermOperator;
use cleanruv::opt::Opt;
use cleanruv::session::run_session;

const EXIT_USAGE: u8 = 2;

async fn driver_main(settings: &Settings, password: String) -> ExitCode {
    debug!("Starting ghost ruv fixer.");

    let mut client = match LdapClient::new(
        settings.uri.clone(),
        settings.ca.clone(),
        settings.bind_dn.clone(),
        password,
    ) {
        Ok(c) => c,
        Err(e) => {
            error!(?e, "Failed to configure the ldap client");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    let mut operator = TermOperator;
    let result = run_session(&mut client, &mut operator, &settings.session()).await;
    client.unbind().await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Sorry, {} ({})", e, settings.uri);
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    let opt = Opt::parse();

    let fmt_layer = fmt::layer().with_writer(std::io::stderr);

    let filter_layer = if opt.debug {
        match EnvFilter::try_new("cleanruv=debug,ds_cleanruv=debug") {
            Ok(f) => f,
            Err(e) => {
                eprintln!("ERROR! Unable to start tracing {:?}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        match EnvFilter::try_from_default_env() {
            Ok(f) => f,
            Err(_) => EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .parse_lossy("cleanruv=info,ds_cleanruv=info"),
        }
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    let config = match opt.config.as_deref() {
        Some(path) => match Config::from_path(path) {
            Ok(c) => c,
            Err(e) => {
                error!("{}", e);
                return ExitCode::from(EXIT_USAGE);
            }
        },
        None => Config::default(),
    };

    let settings = match Settings::resolve(&opt, config, &default_host()) {
        Ok(s) => s,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(EXIT_USAGE);
        }
    };

    let password = match opt.password.clone() {
        Some(pw) => pw,
        None => match rpassword::prompt_password(format!("'{}' password: ", settings.bind_dn)) {
            Ok(pw) => pw,
            Err(e) => {
                error!(?e, "Unable to read the bind password");
                return ExitCode::FAILURE;
            }
        },
    };

    let rt = runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to initialise tokio runtime!");

    rt.block_on(driver_main(&settings, password))
}
