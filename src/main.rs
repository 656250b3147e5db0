use gcpulse::{app::App, cli::Command, Result};

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(err) = run(&args) {
        eprintln!("gcpulse: {err}");
        std::process::exit(1);
    }
}

fn run(args: &[String]) -> Result<()> {
    match Command::parse(args)? {
        Command::ShowHelp => Command::print_help(),
        Command::ShowVersion => println!("gcpulse {}", env!("CARGO_PKG_VERSION")),
        Command::Run(opts) => App::from_options(opts)?.run()?,
    }
    Ok(())
}
