use clap::{Args, Parser, Subcommand};
use hostdeck::{
    HostdeckError, Result,
    config::HostdeckConfig,
    format::{fmt_size, fmt_size_long},
    libvirt::LibvirtProvider,
    logger,
    lvm::LvmCli,
    nic::NicType,
    nic_edit::{EditNicDialog, NicField, SaveOutcome},
    provider::VirtProvider,
    storage::StorageClient,
    vgroup_details::{DeletePrompt, RemoveDecision, VGroupDetails},
};
use nix::unistd::Uid;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

#[derive(Parser)]
#[command(name = "hostdeck")]
#[command(about = "Manage VM network interfaces and LVM volume groups")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Virtual machines
    Vm {
        #[command(subcommand)]
        vm_command: VmCommands,
    },
    /// Network interfaces of a VM
    Nic {
        #[command(subcommand)]
        nic_command: NicCommands,
    },
    /// LVM volume groups
    Vg {
        #[command(subcommand)]
        vg_command: VgCommands,
    },
}

#[derive(Subcommand)]
enum VmCommands {
    /// List all VMs
    #[command(alias = "ls")]
    List,
    /// Show the network interfaces of a VM
    Nics {
        /// VM name
        vm: String,
    },
}

#[derive(Subcommand)]
enum NicCommands {
    /// Change type, source or model of an interface
    Edit(NicEditArgs),
}

#[derive(Args)]
struct NicEditArgs {
    /// VM name
    vm: String,
    /// MAC address of the interface
    mac: String,
    /// New interface type (network, direct, bridge)
    #[arg(long = "type")]
    network_type: Option<NicType>,
    /// Network, device or bridge to attach to
    #[arg(long)]
    source: Option<String>,
    /// Device model
    #[arg(long)]
    model: Option<String>,
}

#[derive(Subcommand)]
enum VgCommands {
    /// List volume groups
    #[command(alias = "ls")]
    List,
    /// Show a volume group with its physical and logical volumes
    Show {
        name: String,
    },
    /// Keep a volume group view open and poll while it needs it
    Watch {
        name: String,
        /// How long to watch
        #[arg(long, default_value_t = 30)]
        seconds: u64,
    },
    /// Add block devices to a volume group
    AddDisk {
        name: String,
        #[arg(required = true)]
        blocks: Vec<String>,
    },
    /// Remove a physical volume, moving its data first when needed
    RemovePv {
        name: String,
        pv: String,
    },
    /// Rename a volume group
    Rename {
        name: String,
        new_name: String,
    },
    /// Delete a volume group and tear down what uses it
    Delete {
        name: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        unsafe {
            std::env::set_var("RUST_LOG", "hostdeck=debug");
        }
    }
    logger::init_logger();

    if !Uid::effective().is_root() {
        logger::warn!("Not running as root; most virsh and LVM operations will fail");
    }

    let config_path = cli.config.unwrap_or_else(HostdeckConfig::default_path);
    let config = HostdeckConfig::load_or_default(&config_path)?;

    let virt = LibvirtProvider::new(&config.libvirt);
    let storage: Arc<dyn StorageClient> = Arc::new(LvmCli::new(&config.storage));

    match cli.command {
        Commands::Vm { vm_command } => handle_vm_command(&virt, vm_command).await,
        Commands::Nic {
            nic_command: NicCommands::Edit(args),
        } => handle_nic_edit(&virt, args).await,
        Commands::Vg { vg_command } => handle_vg_command(storage, &config, vg_command).await,
    }
}

async fn handle_vm_command(virt: &LibvirtProvider, command: VmCommands) -> Result<()> {
    match command {
        VmCommands::List => {
            let vms = virt.list_vms().await?;
            println!("{:<24} {:<10} {:<8} {:<6}", "NAME", "STATE", "ARCH", "NICS");
            println!("{}", "=".repeat(52));
            for vm in &vms {
                println!(
                    "{:<24} {:<10} {:<8} {:<6}",
                    vm.name,
                    vm.state.label(),
                    vm.arch.as_deref().unwrap_or("-"),
                    vm.interfaces.len()
                );
            }
        }
        VmCommands::Nics { vm } => {
            let vm = virt.get_vm(&vm).await?;
            println!("{:<19} {:<9} {:<20} {:<10}", "MAC", "TYPE", "SOURCE", "MODEL");
            println!("{}", "=".repeat(60));
            for nic in &vm.interfaces {
                println!(
                    "{:<19} {:<9} {:<20} {:<10}",
                    nic.mac,
                    nic.nic_type(),
                    nic.source_name().unwrap_or("-"),
                    nic.model
                );
            }
        }
    }
    Ok(())
}

async fn handle_nic_edit(virt: &LibvirtProvider, args: NicEditArgs) -> Result<()> {
    let vm = virt.get_vm(&args.vm).await?;
    let nic = vm
        .interface(&args.mac)
        .ok_or_else(|| HostdeckError::InterfaceNotFound(args.mac.clone()))?
        .clone();
    let sources = virt.available_sources().await?;

    let mut dialog = EditNicDialog::new(&vm, &nic, sources);
    if let Some(network_type) = args.network_type {
        dialog.on_value_changed(NicField::NetworkType(network_type));
    }
    if let Some(source) = args.source {
        if !dialog.source_choices().contains(&source) {
            return Err(HostdeckError::Validation(format!(
                "'{}' is not an available {} source",
                source,
                dialog.state().network_type
            )));
        }
        dialog.on_value_changed(NicField::NetworkSource(Some(source)));
    }
    if let Some(model) = args.model {
        dialog.on_value_changed(NicField::NetworkModel(model));
    }

    if let Some(warning) = dialog.restart_warning() {
        println!("⚠️  {}", warning);
    }

    let mut updates = virt.subscribe();
    match dialog.save(virt).await {
        SaveOutcome::Closed => {
            println!("Interface {} of '{}' saved", nic.mac, vm.name);
            // Show the refreshed definition if it arrives in time.
            if let Ok(Ok(refreshed)) =
                tokio::time::timeout(Duration::from_secs(5), updates.recv()).await
            {
                if let Some(nic) = refreshed.interface(&nic.mac) {
                    println!(
                        "Now: {} {} ({})",
                        nic.nic_type(),
                        nic.source_name().unwrap_or("-"),
                        nic.model
                    );
                }
            }
            Ok(())
        }
        SaveOutcome::Failed => {
            let message = dialog
                .state()
                .dialog_error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            Err(HostdeckError::Validation(message))
        }
        SaveOutcome::NotAllowed => Err(HostdeckError::Validation(
            "No source is available for the selected interface type".to_string(),
        )),
    }
}

async fn handle_vg_command(
    storage: Arc<dyn StorageClient>,
    config: &HostdeckConfig,
    command: VgCommands,
) -> Result<()> {
    let interval = config.storage.poll_interval();
    match command {
        VgCommands::List => {
            let vgroups = storage.list_volume_groups().await?;
            println!("{:<20} {:<12} {:<12} {:<6}", "NAME", "SIZE", "FREE", "BUSY");
            println!("{}", "=".repeat(54));
            for vgroup in &vgroups {
                println!(
                    "{:<20} {:<12} {:<12} {:<6}",
                    vgroup.name,
                    fmt_size(vgroup.size),
                    fmt_size(vgroup.free_size),
                    if vgroup.needs_polling { "yes" } else { "no" }
                );
            }
        }
        VgCommands::Show { name } => {
            let mut details = VGroupDetails::load(storage, &name, Handle::current(), interval).await?;
            print_details(&details);
            details.unmount();
        }
        VgCommands::Watch { name, seconds } => {
            let mut details = VGroupDetails::load(storage, &name, Handle::current(), interval).await?;
            print_details(&details);

            let deadline = tokio::time::Instant::now() + Duration::from_secs(seconds);
            while tokio::time::Instant::now() < deadline {
                tokio::time::sleep(interval).await;
                details.refresh().await?;
                println!(
                    "[{}] {} free, {}",
                    details.last_refreshed().format("%H:%M:%S"),
                    fmt_size(details.vgroup().free_size),
                    if details.is_polling() { "polling" } else { "idle" }
                );
            }
            details.unmount();
        }
        VgCommands::AddDisk { name, blocks } => {
            let details = VGroupDetails::load(storage, &name, Handle::current(), interval).await?;
            let actions = details.actions();
            let candidates = actions.add_disk_candidates().await?;

            let mut selected = Vec::new();
            for block in &blocks {
                let space = candidates
                    .iter()
                    .find(|space| &space.block == block)
                    .ok_or_else(|| {
                        HostdeckError::Validation(format!("{} is not available", block))
                    })?;
                selected.push(space.clone());
            }
            actions.add_disks(&selected).await?;
            println!("Added {} disk(s) to '{}'", selected.len(), name);
        }
        VgCommands::RemovePv { name, pv } => {
            let details = VGroupDetails::load(storage, &name, Handle::current(), interval).await?;
            details.actions().remove_pvol(&pv).await?;
            println!("Removed {} from '{}'", pv, name);
        }
        VgCommands::Rename { name, new_name } => {
            let details = VGroupDetails::load(storage, &name, Handle::current(), interval).await?;
            let location = details.actions().rename(&new_name).await?;
            println!("Renamed '{}' to '{}' ({})", name, new_name, location);
        }
        VgCommands::Delete { name, yes } => {
            let details = VGroupDetails::load(storage, &name, Handle::current(), interval).await?;
            let actions = details.actions();
            match actions.prepare_delete().await? {
                DeletePrompt::Blocked { title, message } => {
                    println!("{}", title);
                    for line in &message {
                        println!("  {}", line);
                    }
                    return Err(HostdeckError::Validation(title));
                }
                DeletePrompt::Confirm {
                    title,
                    danger,
                    teardown,
                    usage,
                } => {
                    println!("{}", title);
                    println!("⚠️  {}", danger);
                    for line in &teardown {
                        println!("  {}", line);
                    }
                    if !yes && !confirm_by_name(&name)? {
                        println!("Aborted");
                        return Ok(());
                    }
                    drop(details);
                    let location = actions.confirm_delete(&usage).await?;
                    println!("Deleted '{}' ({})", name, location);
                }
            }
        }
    }
    Ok(())
}

fn print_details(details: &VGroupDetails) {
    let vgroup = details.vgroup();
    println!("{}", details.title());
    println!("  UUID:     {}", vgroup.uuid);
    println!("  Capacity: {}", fmt_size_long(vgroup.size));
    println!("  Free:     {}", fmt_size(vgroup.free_size));
    println!();
    println!("Physical Volumes");
    for pvol in details.pvols() {
        let removal = match details.remove_decision(pvol) {
            RemoveDecision::Remove => "removable".to_string(),
            RemoveDecision::EmptyThenRemove => "removable after moving data".to_string(),
            RemoveDecision::Disallowed(excuse) => excuse,
        };
        println!(
            "  {:<20} {:<24} {}",
            pvol.path,
            VGroupDetails::pvol_detail(pvol),
            removal
        );
    }
    println!();
    println!("Logical Volumes");
    for lvol in details.lvols() {
        println!(
            "  {:<20} {:<12} {}",
            lvol.name,
            fmt_size(lvol.size),
            if lvol.is_active() { "active" } else { "inactive" }
        );
    }
}

fn confirm_by_name(name: &str) -> Result<bool> {
    print!("Type '{}' to confirm: ", name);
    io::stdout().flush().ok();

    let mut input = String::new();
    io::stdin().read_line(&mut input).map_err(|err| {
        HostdeckError::ConfigError(format!("Failed to read confirmation: {}", err))
    })?;
    Ok(input.trim() == name)
}
