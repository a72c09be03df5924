use crossterm::{
    cursor::{Hide, Show},
    execute,
    terminal::{Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen},
};
use std::io::{self, Write};

/// Owns the terminal while the board is drawn: alternate screen & hidden cursor, both
/// restored on drop (including early returns on error).
#[derive(Debug)]
pub struct TerminalSession {
    _private: (),
}

impl TerminalSession {
    pub fn enter() -> io::Result<Self> {
        execute!(io::stdout(), EnterAlternateScreen, Hide, Clear(ClearType::All))?;
        Ok(Self { _private: () })
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        restore(&mut io::stdout());
    }
}

/// Show the cursor & leave the alternate screen, ignoring failures.
pub fn restore<W: Write>(out: &mut W) {
    let _ = execute!(out, Show, LeaveAlternateScreen);
}

/// Restore the terminal before the default panic message is printed.
pub fn install_panic_hook() {
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        restore(&mut io::stdout());
        original_hook(info);
    }));
}
