use anyhow::{Context, Result};
use tokio::{
    io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    select,
};
use tracing::{info, warn};

use crate::{
    cli::ClientArgs,
    protocol::{self, read_line, send_line},
};

pub async fn run(args: ClientArgs) -> Result<()> {
    let (mut reader, mut writer) = establish_connection(&args).await?;
    let mut stdin = BufReader::new(tokio::io::stdin());

    let Some(username) =
        perform_handshake(&mut reader, &mut writer, &mut stdin, &args.name).await?
    else {
        shutdown_connection(&mut writer).await;
        return Ok(());
    };
    write_stdout(&format!("*** connected as {username}")).await?;

    let mut input = String::new();
    run_chat_loop(&mut reader, &mut writer, &mut stdin, &mut input).await?;
    shutdown_connection(&mut writer).await;

    Ok(())
}

async fn establish_connection(
    args: &ClientArgs,
) -> Result<(BufReader<OwnedReadHalf>, OwnedWriteHalf)> {
    let stream = TcpStream::connect(args.server)
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;

    info!("connected to {}", args.server);

    let (reader, writer) = stream.into_split();
    Ok((BufReader::new(reader), writer))
}

/// Answers the server's naming handshake, starting from the name given on
/// the command line and falling back to stdin when the server rejects a
/// candidate. `None` means the connection or stdin ended first.
async fn perform_handshake(
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    stdin: &mut BufReader<tokio::io::Stdin>,
    initial: &str,
) -> Result<Option<String>> {
    let mut candidate = initial.trim().to_string();

    loop {
        let Some(line) = read_line(reader).await? else {
            write_stdout("*** server closed the connection").await?;
            return Ok(None);
        };
        match line.as_str() {
            protocol::SUBMITNAME => send_line(writer, &candidate).await?,
            protocol::NAMEACCEPTED => return Ok(Some(candidate)),
            protocol::NAMETAKEN => {
                let notice = format!("!!! name '{candidate}' is taken, enter another:");
                match prompt_replacement(stdin, &notice).await? {
                    Some(replacement) => candidate = replacement,
                    None => return Ok(None),
                }
            }
            protocol::INVALIDNAME => {
                let notice = format!("!!! name '{candidate}' is invalid, enter another:");
                match prompt_replacement(stdin, &notice).await? {
                    Some(replacement) => candidate = replacement,
                    None => return Ok(None),
                }
            }
            other => write_stdout(other).await?,
        }
    }
}

async fn prompt_replacement(
    stdin: &mut BufReader<tokio::io::Stdin>,
    notice: &str,
) -> Result<Option<String>> {
    write_stderr(notice).await?;
    let mut replacement = String::new();
    let bytes_read = stdin.read_line(&mut replacement).await?;
    if bytes_read == 0 {
        write_stdout("*** leaving chat").await?;
        return Ok(None);
    }
    Ok(Some(replacement.trim().to_string()))
}

async fn run_chat_loop(
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    stdin: &mut BufReader<tokio::io::Stdin>,
    input: &mut String,
) -> Result<()> {
    loop {
        input.clear();
        select! {
            server_line = read_line(reader) => {
                match server_line? {
                    Some(line) => write_stdout(&line).await?,
                    None => {
                        write_stdout("*** server closed the connection").await?;
                        break;
                    }
                }
            }
            bytes_read = stdin.read_line(input) => {
                if !handle_stdin_input(bytes_read, input, writer).await? {
                    break;
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                handle_ctrl_c(ctrl_c);
                break;
            }
        }
    }
    Ok(())
}

async fn handle_stdin_input(
    bytes_read: io::Result<usize>,
    input: &str,
    writer: &mut OwnedWriteHalf,
) -> Result<bool> {
    let bytes_read = bytes_read?;
    if bytes_read == 0 {
        return Ok(false);
    }

    let text = input.trim_end();
    if text.is_empty() {
        return Ok(true);
    }

    if text.eq_ignore_ascii_case("/quit") {
        write_stdout("*** leaving chat").await?;
        return Ok(false);
    }

    send_line(writer, text).await?;
    Ok(true)
}

fn handle_ctrl_c(result: io::Result<()>) {
    if let Err(error) = result {
        warn!(?error, "ctrl-c handler failed");
    }
}

async fn shutdown_connection(writer: &mut OwnedWriteHalf) {
    if let Err(error) = writer.shutdown().await {
        warn!(?error, "failed to shutdown client writer cleanly");
    }
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}

async fn write_stderr(line: &str) -> io::Result<()> {
    let mut stderr = tokio::io::stderr();
    stderr.write_all(line.as_bytes()).await?;
    stderr.write_all(b"\n").await?;
    stderr.flush().await
}
