use flux_engine::{Event, StatusResult, TaskHandle};

/// Text shown to the user for one controller notification.
pub fn event(ev: &Event) -> String {
    match ev {
        Event::Submitted { handle } => {
            format!("Image generation started. Task ID: {handle}")
        }
        Event::Progress { status, .. } => format!("Current status: {status}"),
        Event::Done {
            image_url,
            download_link,
            ..
        } => format!("Generated image: {image_url}\n{download_link}"),
        Event::Failed { reason, .. } => {
            format!("Failed to generate image. Status: {reason}")
        }
        Event::SubmissionFailed { error } => {
            format!("Failed to submit generation request: {error}")
        }
    }
}

/// Whether `ev` ends a run with an image.
pub fn succeeded(ev: &Event) -> bool {
    matches!(ev, Event::Done { .. })
}

pub fn status(handle: &TaskHandle, status: &StatusResult) -> String {
    match status {
        StatusResult::Ready { image_url } => {
            format!("Task {handle}: {status}\n{image_url}")
        }
        _ => format!("Task {handle}: {status}"),
    }
}
