use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Smoke-test client for a running jq-proxy", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Endpoint name used by the canned requests
    #[arg(short, long, default_value = "jsonplaceholder")]
    endpoint: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check proxy health
    Health,
    /// Show the live configuration
    Config,
    /// Fetch one post unchanged
    Simple,
    /// Reshape a list of posts with jq
    JqTransform,
    /// Create a post through the proxy
    Post,
    /// Call an endpoint that does not exist
    Error,
    /// Run every canned request
    All,
    /// Send an arbitrary proxy request
    Query {
        #[arg(long)]
        endpoint: Option<String>,
        #[arg(long, default_value = "")]
        path: String,
        #[arg(long, default_value = "GET")]
        method: String,
        /// JSON request body
        #[arg(long)]
        body: Option<String>,
        #[arg(long, default_value = ".")]
        jq: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Health => health(&client, &cli.url).await?,
        Commands::Config => config(&client, &cli.url).await?,
        Commands::Simple => simple(&client, &cli.url, &cli.endpoint).await?,
        Commands::JqTransform => jq_transform(&client, &cli.url, &cli.endpoint).await?,
        Commands::Post => post(&client, &cli.url, &cli.endpoint).await?,
        Commands::Error => error(&client, &cli.url).await?,
        Commands::All => {
            health(&client, &cli.url).await?;
            config(&client, &cli.url).await?;
            simple(&client, &cli.url, &cli.endpoint).await?;
            jq_transform(&client, &cli.url, &cli.endpoint).await?;
            post(&client, &cli.url, &cli.endpoint).await?;
            error(&client, &cli.url).await?;
            println!("All requests completed");
        }
        Commands::Query {
            endpoint,
            path,
            method,
            body,
            jq,
        } => {
            let body = match body {
                Some(raw) => serde_json::from_str(&raw)?,
                None => Value::Null,
            };
            let endpoint = endpoint.unwrap_or(cli.endpoint);
            let envelope = json!({ "method": method, "body": body, "jq_query": jq });
            proxy(&client, &cli.url, &endpoint, &path, envelope).await?;
        }
    }

    Ok(())
}

async fn health(client: &reqwest::Client, url: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("== Health check");
    let res = client.get(format!("{url}/health")).send().await?;
    print_response(res).await
}

async fn config(client: &reqwest::Client, url: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("== Configuration");
    let res = client.get(format!("{url}/config")).send().await?;
    print_response(res).await
}

async fn simple(client: &reqwest::Client, url: &str, endpoint: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("== Simple GET request");
    let envelope = json!({ "method": "GET", "jq_query": "." });
    proxy(client, url, endpoint, "/posts/1", envelope).await
}

async fn jq_transform(client: &reqwest::Client, url: &str, endpoint: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("== GET with jq transformation");
    let envelope = json!({
        "method": "GET",
        "transformation_mode": "jq",
        "jq_query": "{posts: [.[] | {id: .id, title: .title}], count: length}",
    });
    proxy(client, url, endpoint, "/posts", envelope).await
}

async fn post(client: &reqwest::Client, url: &str, endpoint: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("== POST request with body");
    let envelope = json!({
        "method": "POST",
        "body": { "title": "Test Post", "body": "This is a test post", "userId": 1 },
        "jq_query": "{created_post: {id: .id, title: .title}}",
    });
    proxy(client, url, endpoint, "/posts", envelope).await
}

async fn error(client: &reqwest::Client, url: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("== Error handling (nonexistent endpoint)");
    let envelope = json!({ "method": "GET", "jq_query": "." });
    proxy(client, url, "nonexistent-endpoint", "/test", envelope).await
}

async fn proxy(
    client: &reqwest::Client,
    url: &str,
    endpoint: &str,
    path: &str,
    envelope: Value,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = if path.is_empty() || path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    let res = client
        .post(format!("{url}/proxy/{endpoint}{path}"))
        .json(&envelope)
        .send()
        .await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    println!("Status: {status}");

    let text = res.text().await?;
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{text}"),
    }
    println!();
    Ok(())
}
