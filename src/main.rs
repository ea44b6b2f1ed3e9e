/* This file is part of DChat
 *
 * Copyright (C) 2026 The DChat developers
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use std::{fs::File, path::PathBuf, sync::Arc};

use async_executor::Executor;
use easy_parallel::Parallel;
use futures::{io::BufReader, AsyncBufReadExt, StreamExt};
use log::{info, warn, Level};
use serde::Deserialize;
use smol::Unblock;
use structopt::StructOpt;
use structopt_toml::StructOptToml;

use dchat::{
    net::{
        contact::{is_valid_onion, is_valid_port, MAX_NICKNAME},
        P2p, Settings, SettingsOpt, TorDialer,
    },
    util::{
        cli::{log_config, spawn_config},
        ui::{ui_fatal, ui_log},
    },
    Result,
};

pub const CONFIG_FILE: &str = "dchat_config.toml";
pub const CONFIG_FILE_CONTENTS: &str = include_str!("../dchat_config.toml");

#[derive(Clone, Debug, Deserialize, StructOpt, StructOptToml)]
#[structopt(name = "dchat", about = "Decentralized p2p chat between onion endpoints")]
pub struct Args {
    /// Sets a custom config file
    #[structopt(long)]
    pub config: Option<String>,

    /// Sets a custom log path
    #[structopt(long)]
    pub log_path: Option<String>,

    #[serde(default)]
    #[structopt(flatten)]
    pub net: SettingsOpt,

    /// Increase verbosity
    #[serde(default)]
    #[structopt(short, parse(from_occurrences))]
    pub verbose: u64,
}

fn main() -> Result<()> {
    // The first pass over the arguments sets up logging and locates the
    // config file, the second overlays them on its contents.
    let args = Args::from_args();

    let (log_level, log_cfg) = log_config(args.verbose);
    let log_path = args.log_path.unwrap_or_else(|| "/tmp/dchat.log".to_string());
    simplelog::CombinedLogger::init(vec![
        simplelog::TermLogger::new(
            log_level,
            log_cfg.clone(),
            simplelog::TerminalMode::Mixed,
            simplelog::ColorChoice::Auto,
        ),
        simplelog::WriteLogger::new(log_level, log_cfg, File::create(log_path)?),
    ])?;

    let cfg_path = PathBuf::from(args.config.unwrap_or_else(|| CONFIG_FILE.to_string()));
    spawn_config(&cfg_path, CONFIG_FILE_CONTENTS.as_bytes())?;

    let cfg_contents = std::fs::read_to_string(&cfg_path)?;
    let args = Args::from_args_with_toml(&cfg_contents)?;

    let settings: Settings = args.net.into();

    if !is_valid_onion(&settings.onion_id) {
        ui_fatal("A valid onion address must be configured (--onion)");
    }

    if !is_valid_port(settings.listen_port) {
        ui_fatal("A valid listening port must be configured (--lport)");
    }

    if settings.nickname.len() > MAX_NICKNAME {
        ui_fatal("The nickname must be at most 31 bytes long");
    }

    let ex: Arc<Executor<'static>> = Arc::new(Executor::new());
    let ex2 = ex.clone();

    let dialer = Arc::new(TorDialer::new(settings.socks_proxy.clone()));
    let p2p = P2p::new(settings, dialer, ex.clone());

    let nthreads = num_cpus::get();
    let (signal, shutdown) = async_channel::unbounded::<()>();

    let (_, result) = Parallel::new()
        .each(0..nthreads, |_| smol::future::block_on(ex.run(shutdown.recv())))
        .finish(|| {
            smol::future::block_on(async move {
                p2p.clone().start().await?;

                ui_log(Level::Info, "Welcome to dchat. Lines from stdin are sent to the room.");

                let stdin = Unblock::new(std::io::stdin());
                let mut lines = BufReader::new(stdin).lines();

                while let Some(line) = lines.next().await {
                    let line = line?;
                    if line.is_empty() {
                        continue
                    }

                    if let Err(e) = p2p.broadcast(&line).await {
                        warn!(target: "dchat", "Broadcast failed: {}", e);
                    }
                }

                info!(target: "dchat", "Input closed, shutting down");
                p2p.stop().await;
                drop(signal);
                Ok(())
            })
        });

    result
}
