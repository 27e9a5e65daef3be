//! UI utilities for the client.

use std::io::Write;

/// Redisplay the prompt after printing an event
pub fn redisplay_prompt(nickname: &str) {
    print!("{}> ", nickname);
    std::io::stdout().flush().ok();
}
