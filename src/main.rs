use clap::Parser;
use secretctl::cli::{commands, output, Cli, Commands};
use secretctl::cli::commands::set::SetArgs;

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init => commands::init::execute(&cli),
        Commands::Set {
            ref key,
            ref value,
            ref fields,
            ref plain_fields,
            ref bindings,
            ref tags,
            ref note,
            ref url,
            ref expires,
            ref folder,
        } => commands::set::execute(
            &cli,
            &SetArgs {
                key,
                value: value.as_deref(),
                fields,
                plain_fields,
                bindings,
                tags,
                note: note.as_deref(),
                url: url.as_deref(),
                expires: expires.as_deref(),
                folder: folder.as_deref(),
            },
        ),
        Commands::Get {
            ref key,
            ref field,
            copy,
        } => commands::get::execute(&cli, key, field.as_deref(), copy),
        Commands::List { ref tag, expiring } => {
            commands::list::execute(&cli, tag.as_deref(), expiring)
        }
        Commands::Delete { ref key, force } => commands::delete::execute(&cli, key, force),
        Commands::Run {
            ref keys,
            ref command,
        } => commands::run::execute(&cli, keys, command),
        Commands::Backup {
            ref output,
            ref keyfile,
            include_audit,
        } => commands::backup_cmd::execute(&cli, output, keyfile.as_deref(), include_audit),
        Commands::Restore {
            ref file,
            ref keyfile,
            ref conflict,
            dry_run,
        } => commands::restore::execute(&cli, file, keyfile.as_deref(), conflict, dry_run),
        Commands::Audit {
            last,
            ref since,
            verify,
        } => commands::audit_cmd::execute(&cli, last, since.as_deref(), verify),
        Commands::Integrity { repair } => commands::integrity::execute(&cli, repair),
        Commands::Serve => commands::serve::execute(&cli),
        Commands::Completions { ref shell } => commands::completions::execute(shell),
    };

    if let Err(e) = result {
        output::error(&e.to_string());
        std::process::exit(e.exit_code());
    }
}
