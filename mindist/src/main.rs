use {
    clap::Parser,
    log::error,
    mindist::{
        group::EXIT_BOOTSTRAP,
        validator::validate,
        Config, LauncherGroup, ProcessGroup, Reporter,
    },
    mindist_cpu_utils::SysfsTopology,
    std::process::exit,
};

#[derive(Parser)]
#[command(version, name = "mindist", about, long_about = None)]
struct Cli {}

fn main() {
    solana_logger::setup_with_default("info");
    let _cli = Cli::parse();

    let group = LauncherGroup::init().unwrap_or_else(|err| {
        error!("Error starting process group: {err}. Terminating.");
        LauncherGroup::abort(EXIT_BOOTSTRAP)
    });
    let context = group.context();

    let config = Config::from_env();
    let topology = SysfsTopology::new(&config.sysfs_root, &config.procfs_root);
    let outcome = validate(
        &topology,
        context.size,
        config.policy.as_deref(),
        || topology.cpu_affinity(),
    );

    Reporter::stderr().report(context.rank, &outcome);
    group.finalize();
    exit(outcome.exit_code());
}
