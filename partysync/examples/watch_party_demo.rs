//! Démo d'une watch party entre deux navigateurs simulés
//!
//! L'admin démarre une party, un invité la rejoint via le lien
//! d'invitation, puis la playlist avance et l'admin déplace la lecture.
//! Les deux navigateurs partagent un backend en mémoire.

use std::sync::Arc;
use std::time::Duration;

use partysync::logs::{init_logging, LoggingOptions};
use partysync::playback::{MediaElement, MemoryMedia, MemoryPage, PlaybackSync};
use partysync::{
    CoordinatorDeps, CoordinatorSettings, FilePartyStore, MemoryBackend, MemoryPartyStore,
    MemoryTabHost, PartyCoordinator, PartyStore, PlaylistBackend, SystemClock, UserId,
};
use tokio_util::sync::CancellationToken;

const FIRST: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";
const SECOND: &str = "https://www.youtube.com/watch?v=9bZkp7q19f0";

#[tokio::main]
async fn main() -> partysync::Result<()> {
    let log_state = init_logging(LoggingOptions::from_config());
    println!("=== Watch Party Demo ===\n");

    let backend = MemoryBackend::new();

    // Navigateur de l'admin : configuration et stockage réels
    let admin_host = Arc::new(MemoryTabHost::new());
    let admin_store = Arc::new(FilePartyStore::from_config()?);
    let admin = PartyCoordinator::spawn(CoordinatorDeps::new(
        Arc::new(backend.clone()),
        admin_host.clone(),
        admin_store.clone(),
        CoordinatorSettings::from_config()?,
    ));
    let _admin_events = admin.attach(&admin_host.events());

    // Navigateur de l'invité : tout en mémoire
    let guest_host = Arc::new(MemoryTabHost::new());
    let guest_store = Arc::new(MemoryPartyStore::new());
    let guest = PartyCoordinator::spawn(CoordinatorDeps::new(
        Arc::new(backend.clone()),
        guest_host.clone(),
        guest_store.clone(),
        CoordinatorSettings::new("youtube", "guest"),
    ));
    let _guest_events = guest.attach(&guest_host.events());

    let admin_tab = admin_host.open_tab(FIRST, true);
    let playlist_id = admin.start_party(FIRST, admin_tab).await?;
    let invitation = backend.playlist(&playlist_id).await?.url;
    println!("Party {playlist_id} started, invitation: {invitation}");

    // L'invité ouvre le lien reçu
    let guest_tab = guest_host.open_tab("https://www.youtube.com/", true);
    guest_host.load(guest_tab, &invitation);
    while !guest.binding().await?.is_bound() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    println!(
        "Guest tab {guest_tab} bound, now on {}",
        guest_host.location(guest_tab).unwrap_or_default()
    );

    // Lecture synchronisée
    let clock = Arc::new(SystemClock);
    let sync = Arc::new(PlaybackSync::new(Arc::new(backend.clone()), clock));
    let cancel = CancellationToken::new();

    let admin_media = MemoryMedia::new(0.0);
    let guest_media = MemoryMedia::new(0.0);
    let admin_party = admin_store.load().await?;
    let guest_party = guest_store.load().await?;

    let mut sessions = Vec::new();
    for (party, media) in [(admin_party, admin_media.clone()), (guest_party, guest_media.clone())] {
        let Some(party) = party else { continue };
        let sync = sync.clone();
        let cancel = cancel.clone();
        sessions.push(tokio::spawn(async move {
            sync.run(&party, &MemoryPage::with_media(media), cancel).await
        }));
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    admin_media.user_seek(73.4);
    tokio::time::sleep(Duration::from_millis(100)).await;
    println!(
        "Admin seeked to {:.1}s, guest now at {:.1}s",
        admin_media.current_time(),
        guest_media.current_time()
    );

    // La vidéo suivante commence
    backend
        .add_track(&playlist_id, SECOND, Some("Second"), &UserId::from("guest"))
        .await?;
    backend.advance(&playlist_id)?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    println!(
        "Playlist advanced: admin tab on {}, guest tab on {}",
        admin_host.location(admin_tab).unwrap_or_default(),
        guest_host.location(guest_tab).unwrap_or_default()
    );

    cancel.cancel();
    for session in sessions {
        if let Ok(Err(e)) = session.await {
            eprintln!("Playback sync failed: {e}");
        }
    }

    guest.leave_party(guest_tab).await?;
    admin.leave_party(admin_tab).await?;
    println!("\nBoth browsers left the party");

    println!("\n=== Recent log entries ===");
    for entry in log_state.dump().iter().rev().take(10).rev() {
        println!("[{}] {} {}", entry.level, entry.target, entry.message);
    }

    Ok(())
}
