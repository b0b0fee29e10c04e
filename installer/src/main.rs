//! cish installer CLI entrypoint.
//!
//! This binary installs a cish release at a fixed system path, or removes a
//! previous installation. Progress and errors are written to standard error.

use cish_installer::cli::{Cli, Command, InstallArgs, UninstallArgs};
use cish_installer::config::InstallConfig;
use cish_installer::error::Result;
use cish_installer::exec::{Privilege, SystemCommandExecutor};
use cish_installer::facade::InstallerFacade;
use cish_installer::output::{removal_message, report_install, write_stderr_line};
use cish_installer::placement::LocalFilesystem;
use cish_installer::transport::HttpTransport;
use cish_installer::uninstall::{UninstallPlan, uninstall};
use clap::Parser;
use std::io::Write;

fn main() {
    let cli = Cli::parse();
    let mut stderr = std::io::stderr();
    let run_result = run(&cli, &mut stderr);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn run(cli: &Cli, stderr: &mut dyn Write) -> Result<()> {
    match &cli.command {
        Command::Install(args) => run_install(args, stderr),
        Command::Uninstall(args) => run_uninstall(args, stderr),
    }
}

fn run_install(args: &InstallArgs, stderr: &mut dyn Write) -> Result<()> {
    let config = InstallConfig::from_args(args)?;
    let transport = HttpTransport::new(config.timeout, config.retry);
    let facade = InstallerFacade::new(&transport, &LocalFilesystem, &SystemCommandExecutor);

    let outcome = facade.install(&config, stderr)?;
    if !config.quiet {
        report_install(&outcome, stderr);
    }
    Ok(())
}

fn run_uninstall(args: &UninstallArgs, stderr: &mut dyn Write) -> Result<()> {
    let plan = uninstall_plan(args);
    let removed = uninstall(&plan, &LocalFilesystem, &SystemCommandExecutor, stderr)?;
    if !args.quiet {
        write_stderr_line(stderr, removal_message(&removed));
    }
    Ok(())
}

fn uninstall_plan(args: &UninstallArgs) -> UninstallPlan {
    UninstallPlan {
        destination: args.destination.clone(),
        artifact_path: args.artifact_path.clone(),
        privilege: Privilege::from_sudo_flag(args.sudo),
    }
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_stderr_line(stderr, err);
            1
        }
    }
}
