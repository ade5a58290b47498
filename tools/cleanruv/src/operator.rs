use std::io;

use dialoguer::console::Term;
use dialoguer::{Confirm, Input};

/// The interactive person driving the tool. Rendering and reading input stays
/// behind this so the ruv logic can be driven by a script.
pub trait Operator {
    fn show(&mut self, text: &str);

    fn read_line(&mut self, prompt: &str) -> io::Result<String>;

    /// Ask a yes/no question, where an empty answer means no.
    fn confirm(&mut self, prompt: &str) -> io::Result<bool>;

    fn pause(&mut self, prompt: &str) -> io::Result<()>;
}

fn to_io_error(e: dialoguer::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e.to_string())
}

/// An operator sitting at the controlling terminal.
#[derive(Debug, Default)]
pub struct TermOperator;

impl Operator for TermOperator {
    fn show(&mut self, text: &str) {
        println!("{}", text);
    }

    fn read_line(&mut self, prompt: &str) -> io::Result<String> {
        Input::<String>::new()
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()
            .map_err(to_io_error)
    }

    fn confirm(&mut self, prompt: &str) -> io::Result<bool> {
        Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .map_err(to_io_error)
    }

    fn pause(&mut self, prompt: &str) -> io::Result<()> {
        let term = Term::stdout();
        term.write_str(prompt)?;
        term.read_line().map(|_| ())
    }
}
