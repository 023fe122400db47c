use anyhow::{bail, Context};
use service_instance_registry::config::AppConfig;
use service_instance_registry::{connect_repository, Attributes, InstanceKey};

const USAGE: &str = "usage: service-instance-registry <command>

commands:
  migrate                                       apply the schema
  provision <service> <org> <space> [attrs]     find or create an instance (attrs: JSON object)
  lookup <service> <org> <space>                print the stored instance
  deprovision <service> <org> <space>           delete an instance without bindings
  reset [--cascade]                             delete every instance";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    // Initialize logging with explicit filter to suppress sqlx debug logs
    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("sqlx", LevelFilter::Warn)
        .parse_default_env()
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        bail!("{}", USAGE);
    };

    let config = AppConfig::load()?;
    log::info!(
        "Configuration loaded: conflict_policy={:?}",
        config.registry.conflict_policy
    );

    let repository = connect_repository(&config).await?;

    match (command.as_str(), &args[1..]) {
        ("migrate", []) => {
            repository.store().migrate().await?;
            log::info!("Database schema is up to date");
        }
        ("provision", [service, org, space, rest @ ..]) if rest.len() <= 1 => {
            let attributes: Attributes = match rest.first() {
                Some(raw) => serde_json::from_str(raw).context("Attributes must be a JSON object")?,
                None => Attributes::new(),
            };
            let result = repository
                .find_or_create(InstanceKey::new(service, org, space), attributes)
                .await?;
            println!(
                "{}",
                serde_json::json!({ "created": result.created, "instance": result.instance })
            );
        }
        ("lookup", [service, org, space]) => {
            match repository.lookup(&InstanceKey::new(service, org, space)).await? {
                Some(instance) => println!("{}", serde_json::to_string_pretty(&instance)?),
                None => bail!("Service instance not found: {}/{}/{}", service, org, space),
            }
        }
        ("deprovision", [service, org, space]) => {
            let deleted = repository
                .delete(&InstanceKey::new(service, org, space))
                .await?;
            println!("{}", serde_json::json!({ "deleted": deleted }));
        }
        ("reset", flags) if flags.iter().all(|f| f == "--cascade") => {
            repository.clear_all(!flags.is_empty()).await?;
        }
        _ => bail!("{}", USAGE),
    }

    Ok(())
}
