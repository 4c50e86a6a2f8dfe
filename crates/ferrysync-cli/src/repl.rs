//! Interactive command loop: list server entries, show the menu, read a
//! line, dispatch — mirroring the reference client's `main`/
//! `handle_command`.

use std::io::{self, Write};

use ferrysync_transport::RetryPolicy;

use crate::commands;
use crate::config::ClientConfig;
use crate::net::Control;
use crate::sync;

const MENU: &str = r#"
    *! COMMAND MENU ! ^^^^^check the available entries on server^^^^
    ********************************************
    * sync list|add|remove|run|auto  - manage and run configured syncs
    * <filename>          - Download a file by entering its name
    * all                 - Download all files in the current directory
    * upload <filename> or <path>  - Upload a file to the server
    * supload <folder> or <path>   - Upload an entire folder to the server
    * cd <folder>         - Change to the specified directory (e.g., cd my_files)
    * cd ..               - Go back to the parent directory
    * kill                - kill every files on server
    * (press enter)       - Exit the client

    Enter command: "#;

pub async fn run(control: Control, download_retry: RetryPolicy) -> anyhow::Result<()> {
    commands::ensure_client_files_dir()?;
    let mut config = ClientConfig::load().unwrap_or_default();

    loop {
        let files = display_server_files(&control).await;
        let command = prompt(MENU)?;
        if command.trim().is_empty() {
            break;
        }
        dispatch(&control, &mut config, &command, &files, download_retry).await;
    }

    println!("\nClient session finished. Exiting.");
    Ok(())
}

async fn display_server_files(control: &Control) -> Vec<String> {
    match control.exchange("LIST_FILES").await {
        Ok(reply) if reply.starts_with("OK") => {
            let entries: Vec<String> = reply.split_whitespace().skip(1).map(String::from).collect();
            println!("\nAvailable entries on server:");
            if entries.is_empty() {
                println!("(empty)");
            } else {
                println!("{}", entries.join(" "));
            }
            println!("{}", "-".repeat(50));
            entries
        }
        Ok(_) => {
            println!("Error: Could not get file list from server");
            Vec::new()
        }
        Err(e) => {
            println!("Error getting file list: {e}");
            Vec::new()
        }
    }
}

fn prompt(text: &str) -> anyhow::Result<String> {
    print!("{text}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

async fn dispatch(
    control: &Control,
    config: &mut ClientConfig,
    command: &str,
    files: &[String],
    download_retry: RetryPolicy,
) {
    let first_word = command.split_whitespace().next().unwrap_or("").to_ascii_lowercase();
    let rest = command
        .split_once(char::is_whitespace)
        .map(|(_, r)| r.trim())
        .unwrap_or("");

    match first_word.as_str() {
        "cd" => commands::handle_cd(control, rest).await,
        "upload" => commands::handle_upload(control, rest).await,
        "supload" => commands::handle_supload(control, rest).await,
        "sync" => handle_sync(control, config, rest).await,
        "kill" => commands::handle_kill(control).await,
        "all" => commands::handle_all(control, files, download_retry).await,
        _ => commands::handle_single_download(control, command, download_retry).await,
    }
}

async fn handle_sync(control: &Control, config: &mut ClientConfig, args: &str) {
    let mut parts = args.split_whitespace();
    match parts.next() {
        None | Some("run") => sync::run_once(control, config).await,
        Some("auto") => sync::run_auto(control, config).await,
        Some("list") => sync::list(config),
        Some("add") => match (parts.next(), parts.next()) {
            (Some(local), Some(remote)) => sync::add(config, local, remote),
            _ => println!("Usage: sync add <local_path> <remote_path>"),
        },
        Some("remove") => match parts.next().and_then(|s| s.parse::<u32>().ok()) {
            Some(id) => sync::remove(config, id),
            None => println!("Usage: sync remove <id>"),
        },
        Some(other) => println!("[ERROR] Unknown sync subcommand '{other}'"),
    }
}
