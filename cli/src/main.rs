mod commands;

use clap::{Arg, ArgAction, ArgMatches, Command};
use kind_utils::setup_logging;
use log::error;

use commands::{cluster, image};

fn build_cli() -> Command {
    Command::new("kindweave")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Declarative lifecycle management for local kind clusters")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("cluster")
                .about("Manage kind clusters from spec files")
                .subcommand_required(true)
                .subcommand(
                    Command::new("apply")
                        .about("Create the cluster in a spec file, replacing it if it changed")
                        .arg(
                            Arg::new("file")
                                .help("Cluster spec, e.g. cluster.yaml")
                                .required(true),
                        ),
                )
                .subcommand(
                    Command::new("diff")
                        .about("Show what apply would change")
                        .arg(Arg::new("file").help("Cluster spec").required(true)),
                )
                .subcommand(
                    Command::new("read")
                        .about("Refresh a managed cluster's record")
                        .arg(Arg::new("name").required(true)),
                )
                .subcommand(
                    Command::new("get")
                        .about("Show any existing kind cluster")
                        .arg(Arg::new("name").required(true))
                        .arg(
                            Arg::new("kubeconfig")
                                .long("kubeconfig")
                                .help("Print the kubeconfig instead of a summary")
                                .action(ArgAction::SetTrue),
                        ),
                )
                .subcommand(
                    Command::new("delete")
                        .about("Delete a cluster")
                        .arg(Arg::new("name").required(true)),
                )
                .subcommand(
                    Command::new("list").about("List kind clusters, * marks managed ones"),
                ),
        )
        .subcommand(
            Command::new("ephemeral")
                .about("Throwaway clusters with the default topology")
                .subcommand_required(true)
                .subcommand(Command::new("create").arg(Arg::new("name").required(true)))
                .subcommand(Command::new("delete").arg(Arg::new("name").required(true))),
        )
        .subcommand(
            Command::new("image")
                .about("Distribute local images into cluster nodes")
                .subcommand_required(true)
                .subcommand(
                    Command::new("load")
                        .about("Load a local image into every node of a cluster")
                        .arg(Arg::new("image").required(true))
                        .arg(
                            Arg::new("cluster")
                                .long("cluster")
                                .short('c')
                                .help("Name of the kind cluster")
                                .required(true),
                        ),
                )
                .subcommand(Command::new("status").about("Re-check recorded loads"))
                .subcommand(
                    Command::new("forget")
                        .about("Forget a recorded load, the image stays on the nodes")
                        .arg(Arg::new("image").required(true))
                        .arg(
                            Arg::new("cluster")
                                .long("cluster")
                                .short('c')
                                .required(true),
                        ),
                ),
        )
}

fn arg<'a>(matches: &'a ArgMatches, id: &str) -> &'a str {
    // Only called for arguments declared as required.
    matches
        .get_one::<String>(id)
        .map(String::as_str)
        .unwrap_or_default()
}

async fn dispatch(matches: &ArgMatches) -> anyhow::Result<()> {
    match matches.subcommand() {
        Some(("cluster", cluster_matches)) => match cluster_matches.subcommand() {
            Some(("apply", m)) => cluster::handle_apply(arg(m, "file")).await,
            Some(("diff", m)) => cluster::handle_diff(arg(m, "file")).await,
            Some(("read", m)) => cluster::handle_read(arg(m, "name")).await,
            Some(("get", m)) => {
                cluster::handle_get(arg(m, "name"), m.get_flag("kubeconfig")).await
            }
            Some(("delete", m)) => cluster::handle_delete(arg(m, "name")).await,
            Some(("list", _)) => cluster::handle_list().await,
            _ => unreachable!(),
        },
        Some(("ephemeral", ephemeral_matches)) => match ephemeral_matches.subcommand() {
            Some(("create", m)) => cluster::handle_ephemeral_create(arg(m, "name")).await,
            Some(("delete", m)) => cluster::handle_ephemeral_delete(arg(m, "name")).await,
            _ => unreachable!(),
        },
        Some(("image", image_matches)) => match image_matches.subcommand() {
            Some(("load", m)) => image::handle_load(arg(m, "image"), arg(m, "cluster")).await,
            Some(("status", _)) => image::handle_status().await,
            Some(("forget", m)) => image::handle_forget(arg(m, "image"), arg(m, "cluster")).await,
            _ => unreachable!(),
        },
        _ => unreachable!(),
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = setup_logging() {
        eprintln!("Failed to set up logging: {}", e);
    }

    let matches = build_cli().get_matches();
    if let Err(e) = dispatch(&matches).await {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
