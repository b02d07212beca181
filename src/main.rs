use aotcache::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("Error: {e:?}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use aotcache::cli::{AotcCli, Command};

    #[test]
    fn sweep_command_honors_range_flags() {
        let cli = AotcCli::parse_from([
            "aotc", "--hasher", "static", "sweep", "--from", "4", "--to", "9", "--rank", "2",
        ]);
        match cli.command() {
            Command::Sweep { from, to, rank } => {
                assert_eq!((*from, *to, *rank), (4, 9, 2));
            }
            other => panic!("expected sweep command, got {other:?}"),
        }
    }

    #[test]
    fn race_defaults_to_eight_threads() {
        let cli = AotcCli::parse_from(["aotc", "race"]);
        match cli.command() {
            Command::Race { threads, .. } => assert_eq!(*threads, 8),
            other => panic!("expected race command, got {other:?}"),
        }
    }
}
