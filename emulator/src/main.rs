mod command;
mod session;

use std::env;
use std::io::{self, BufRead, Write};
use std::process;
use std::rc::Rc;

use session::{Output, Session};
use supervisor_core::config::HubProfile;

fn main() -> io::Result<()> {
    let profile = parse_profile().unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("Usage: hub-emulator [--hub <move|city|technic|prime|essential>]");
        process::exit(2);
    });

    println!("Hub emulator ({profile} hub) ready. Type `help` for commands or `exit` to quit.");

    let output = Output::default();
    let console = ConsoleInput {
        reader: io::stdin().lock(),
        output: Rc::clone(&output),
    };
    let state = Session::new(profile, console, Rc::clone(&output)).run();

    flush(&output)?;
    match state {
        Some(state) => println!("Session ended in {state:?}."),
        None => println!("Session closed."),
    }
    Ok(())
}

/// Console lines for the session. Pending output is printed before each
/// prompt so responses appear in order.
struct ConsoleInput<R> {
    reader: R,
    output: Output,
}

impl<R: BufRead> Iterator for ConsoleInput<R> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        flush(&self.output).ok()?;

        let mut stdout = io::stdout();
        write!(stdout, "> ").ok()?;
        stdout.flush().ok()?;

        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) | Err(_) => {
                println!();
                None
            }
            Ok(_) => Some(line),
        }
    }
}

fn flush(output: &Output) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    for line in output.borrow_mut().drain(..) {
        writeln!(stdout, "{line}")?;
    }
    Ok(())
}

fn parse_profile() -> Result<HubProfile, String> {
    let mut args = env::args().skip(1);
    let Some(arg) = args.next() else {
        return Ok(HubProfile::CityHub);
    };

    let value = if let Some(value) = arg.strip_prefix("--hub=") {
        value.to_string()
    } else if arg == "--hub" {
        args.next()
            .ok_or_else(|| "Expected value after --hub".to_string())?
    } else {
        arg
    };

    value
        .parse()
        .map_err(|_| format!("Unknown hub profile `{value}`"))
}
