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

use log::{error, log, Level};

/// Reports a user-facing event through the logging sink.
pub fn ui_log(level: Level, msg: &str) {
    log!(target: "ui", level, "{}", msg);
}

/// Reports an unrecoverable error and terminates the process after
/// flushing the logging sink.
pub fn ui_fatal(msg: &str) -> ! {
    error!(target: "ui", "{}", msg);
    log::logger().flush();
    std::process::exit(1);
}

/// Renders a received chat message.
pub fn print_dchat_msg(nickname: &str, msg: &str) {
    println!("{}: {}", nickname, msg);
}
