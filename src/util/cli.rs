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

use std::{env, fs, path::Path};

use simplelog::{ConfigBuilder, LevelFilter};

use super::ui::ui_fatal;
use crate::Result;

/// Maps the `-v` occurrence count onto a log level and builds the logger
/// config. Set `DCHAT_LOG_TARGETS` to a comma separated list of targets,
/// e.g. `net::p2p,net::protocol`, to narrow logging down to those.
pub fn log_config(verbosity: u64) -> (LevelFilter, simplelog::Config) {
    let level = match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = ConfigBuilder::new();
    if let Ok(targets) = env::var("DCHAT_LOG_TARGETS") {
        for target in targets.split(',') {
            builder.add_filter_allow(target.to_string());
        }
    }

    (level, builder.build())
}

/// Seeds a default config file if none exists yet. Seeding is terminal:
/// the node reports through the ui sink and exits, so the user reviews
/// the file before the node ever touches the network.
pub fn spawn_config(path: &Path, contents: &[u8]) -> Result<()> {
    if path.exists() {
        return Ok(())
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(path, contents)?;

    ui_fatal(&format!(
        "Config file created in '{}'. Review it and start dchat again.",
        path.display(),
    ))
}
