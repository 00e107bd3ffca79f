//! Inbound message handlers.
//!
//! Each handler validates its payload, persists through the chat store, and
//! broadcasts the result through the hub. Failures are logged and dropped;
//! no error frame is sent back to the client.

use crate::metrics;
use crate::session::ChatContext;
use huddle_core::{validate_room_id, NewMessage, NewRoom};
use huddle_protocol::{
    Inbound, IncomingCreateRoom, IncomingJoinRoom, IncomingText, OutgoingText, Outbound,
    ReactMessage, RoomCreated, RoomMemberJoined,
};
use huddle_transport::ConnectionId;
use tracing::{debug, error, warn};

/// Route a decoded inbound message to its handler.
pub async fn dispatch(ctx: &ChatContext, connection_id: &ConnectionId, inbound: Inbound) {
    match inbound {
        Inbound::Message(text) => handle_message(ctx, connection_id, text).await,
        Inbound::React(react) => handle_react(ctx, connection_id, react).await,
        Inbound::CreateRoom(create) => handle_create_room(ctx, connection_id, create).await,
        Inbound::JoinRoom(join) => handle_join_room(ctx, connection_id, join).await,
        Inbound::Ignored(reason) => {
            debug!(connection = %connection_id, reason = %reason, "Ignoring frame");
        }
    }
}

async fn handle_message(ctx: &ChatContext, connection_id: &ConnectionId, text: IncomingText) {
    if let Err(reason) = validate_room_id(&text.room_id) {
        debug!(connection = %connection_id, reason, "Dropping message");
        return;
    }
    let Some(sender) = ctx.hub.presence_for(connection_id) else {
        warn!(connection = %connection_id, "Message from unregistered connection");
        return;
    };

    match ctx.store.room_exists(&text.room_id).await {
        Ok(true) => {}
        Ok(false) => {
            debug!(connection = %connection_id, room = %text.room_id, "Message for unknown room");
            return;
        }
        Err(e) => {
            warn!(connection = %connection_id, room = %text.room_id, error = %e, "Room lookup failed");
            metrics::record_error("store");
            return;
        }
    }

    let saved = match ctx
        .store
        .save_message(NewMessage {
            room_id: text.room_id,
            sender_id: sender.user_id.clone(),
            content: text.content,
            reply_to: text.reply_content,
        })
        .await
    {
        Ok(saved) => saved,
        Err(e) => {
            warn!(connection = %connection_id, error = %e, "Failed to save message");
            metrics::record_error("store");
            return;
        }
    };

    let room_id = saved.room_id.clone();
    let outgoing = Outbound::Message(OutgoingText {
        message_id: saved.id,
        sender_id: saved.sender_id,
        content: saved.content,
        room_id: saved.room_id,
        reply_content: saved.reply_to,
        sender_name: sender.name,
        sender_profile: sender.profile,
        reactions: saved.reactions,
        created_at: saved.created_at,
    });
    broadcast_room(ctx, connection_id, &room_id, &outgoing);
}

async fn handle_react(ctx: &ChatContext, connection_id: &ConnectionId, react: ReactMessage) {
    if react.message_id.is_empty() {
        debug!(connection = %connection_id, "Dropping reaction without message id");
        return;
    }

    let message = match ctx.store.add_reaction(&react.message_id, react.react_type).await {
        Ok(message) => message,
        Err(e) => {
            warn!(connection = %connection_id, message = %react.message_id, error = %e, "Failed to add reaction");
            metrics::record_error("store");
            return;
        }
    };

    broadcast_room(ctx, connection_id, &message.room_id, &Outbound::React(react));
}

async fn handle_create_room(
    ctx: &ChatContext,
    connection_id: &ConnectionId,
    create: IncomingCreateRoom,
) {
    let Some(creator) = ctx.hub.presence_for(connection_id) else {
        warn!(connection = %connection_id, "Create room from unregistered connection");
        return;
    };

    let room = match ctx
        .store
        .create_room(NewRoom {
            creator_id: creator.user_id,
            member_ids: Vec::new(),
            name: create.chat_name,
            background: create.background,
            is_public: create.is_public,
        })
        .await
    {
        Ok(room) => room,
        Err(e) => {
            warn!(connection = %connection_id, error = %e, "Failed to create room");
            metrics::record_error("store");
            return;
        }
    };

    ctx.hub.join_room(&room.id, connection_id);

    let created = Outbound::RoomCreated(RoomCreated {
        room_id: room.id,
        created_by: room.creator_id,
        chat_name: room.name,
        member_ids: room.member_ids,
        background: room.background,
        is_public: room.is_public,
    });
    match created.encode() {
        Ok(frame) => {
            let recipients = ctx.hub.broadcast_to_all(frame.clone());
            metrics::record_message(frame.len(), "broadcast");
            debug!(connection = %connection_id, recipients, "Room created");
        }
        Err(e) => error!(connection = %connection_id, error = %e, "Failed to encode room"),
    }
    metrics::record_hub_stats(&ctx.hub.stats());
}

async fn handle_join_room(ctx: &ChatContext, connection_id: &ConnectionId, join: IncomingJoinRoom) {
    if let Err(reason) = validate_room_id(&join.room_id) {
        debug!(connection = %connection_id, reason, "Dropping join");
        return;
    }
    let Some(member) = ctx.hub.presence_for(connection_id) else {
        warn!(connection = %connection_id, "Join from unregistered connection");
        return;
    };

    if let Err(e) = ctx.store.join_room(&join.room_id, &member.user_id).await {
        warn!(connection = %connection_id, room = %join.room_id, error = %e, "Failed to join room");
        metrics::record_error("store");
        return;
    }

    if !ctx.hub.join_room(&join.room_id, connection_id) {
        return;
    }

    let joined = Outbound::RoomMemberJoined(RoomMemberJoined {
        room_id: join.room_id.clone(),
        user_id: member.user_id,
        name: member.name,
        profile: member.profile,
    });
    broadcast_room(ctx, connection_id, &join.room_id, &joined);
    metrics::record_hub_stats(&ctx.hub.stats());
}

fn broadcast_room(ctx: &ChatContext, connection_id: &ConnectionId, room_id: &str, outbound: &Outbound) {
    match outbound.encode() {
        Ok(frame) => {
            let recipients = ctx.hub.broadcast_to_room(room_id, frame.clone());
            metrics::record_message(frame.len(), "broadcast");
            debug!(
                connection = %connection_id,
                room = %room_id,
                kind = %outbound.envelope_type(),
                recipients,
                "Broadcast"
            );
        }
        Err(e) => error!(connection = %connection_id, error = %e, "Failed to encode frame"),
    }
}
