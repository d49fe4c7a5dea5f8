use std::path::PathBuf;

use droidforge_core::config::ForgeConfig;
use droidforge_core::CancellationToken;
use droidforge_resolve::{
    collect_declarations, DependencyResolver, Origin, ResolveEvent, ResolveReport, ResolverOptions,
};

pub struct ResolveArgs {
    pub project_dir: PathBuf,
}

pub fn run(args: ResolveArgs) -> Result<ResolveReport, String> {
    let config = ForgeConfig::load(&args.project_dir).map_err(|err| err.to_string())?;
    let dependencies = collect_declarations(&args.project_dir).map_err(|err| err.to_string())?;
    if dependencies.is_empty() {
        return Ok(ResolveReport::default());
    }
    let resolver = DependencyResolver::new(
        ResolverOptions::from_config(&config),
        &config.toolchain.user_agent,
        config.resolver.max_redirects,
    )
    .map_err(|err| format!("failed to create resolver: {}", err))?;
    let report = resolver.resolve_all(&dependencies, &CancellationToken::new(), &|event| {
        match event {
            ResolveEvent::Resolved { coordinate, origin } => {
                println!("{} <- {}", coordinate, describe(&origin))
            }
            ResolveEvent::Failed { coordinate, reason } => {
                eprintln!("{} failed: {}", coordinate, reason)
            }
        }
    });
    Ok(report)
}

fn describe(origin: &Origin) -> String {
    match origin {
        Origin::Run => "this run".to_string(),
        Origin::Disk => "cache".to_string(),
        Origin::Remote(repository) => repository.clone(),
    }
}
