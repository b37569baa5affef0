use argh::FromArgs;
use path_commands::{Command, Registry, Runner};

#[derive(FromArgs)]
/// Walk through the command registry of this machine.
struct Tour {
    /// print the one-line documentation of this command
    #[argh(option)]
    doc: Option<String>,

    /// print the full documentation of this command
    #[argh(option)]
    manual: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let tour: Tour = argh::from_env();
    let commands = Registry::discover();
    println!("{} commands on PATH", commands.len());

    println!("\n$ echo hello world");
    let echo = Command::with_runner("echo", Runner::new().text());
    println!("{}", echo.call(["hello", "world!"])?);

    println!("\n$ pwd");
    if let Some(pwd) = commands.get("pwd") {
        println!("{}", String::from_utf8_lossy(&pwd.call(())?));
    }

    println!("\n$ false");
    match Runner::new().run("false") {
        Ok(_) => println!("unexpected success"),
        Err(e) => println!("{e}"),
    }

    if let Some(name) = tour.doc {
        println!("\n{name}: {}", commands.command(&name)?.doc());
    }
    if let Some(name) = tour.manual {
        commands.command(&name)?.help();
    }
    Ok(())
}
