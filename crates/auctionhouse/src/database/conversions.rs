//! Conversions between the API model types and the raw table rows.

use model::{
    auction::{Auction, AuctionStatus, AuctionType},
    bid::{Bid, BidStatus},
    deposit::{Deposit, DepositStatus},
    sealed_bid::SealedBid,
};

pub fn auction_status_into(status: AuctionStatus) -> database::auctions::AuctionStatus {
    match status {
        AuctionStatus::Scheduled => database::auctions::AuctionStatus::Scheduled,
        AuctionStatus::Active => database::auctions::AuctionStatus::Active,
        AuctionStatus::Ended => database::auctions::AuctionStatus::Ended,
        AuctionStatus::Completed => database::auctions::AuctionStatus::Completed,
        AuctionStatus::Cancelled => database::auctions::AuctionStatus::Cancelled,
    }
}

pub fn auction_status_from(status: database::auctions::AuctionStatus) -> AuctionStatus {
    match status {
        database::auctions::AuctionStatus::Scheduled => AuctionStatus::Scheduled,
        database::auctions::AuctionStatus::Active => AuctionStatus::Active,
        database::auctions::AuctionStatus::Ended => AuctionStatus::Ended,
        database::auctions::AuctionStatus::Completed => AuctionStatus::Completed,
        database::auctions::AuctionStatus::Cancelled => AuctionStatus::Cancelled,
    }
}

pub fn auction_type_into(auction_type: AuctionType) -> database::auctions::AuctionType {
    match auction_type {
        AuctionType::English => database::auctions::AuctionType::English,
        AuctionType::SealedBid => database::auctions::AuctionType::SealedBid,
    }
}

pub fn auction_type_from(auction_type: database::auctions::AuctionType) -> AuctionType {
    match auction_type {
        database::auctions::AuctionType::English => AuctionType::English,
        database::auctions::AuctionType::SealedBid => AuctionType::SealedBid,
    }
}

pub fn bid_status_into(status: BidStatus) -> database::bids::BidStatus {
    match status {
        BidStatus::Active => database::bids::BidStatus::Active,
        BidStatus::Outbid => database::bids::BidStatus::Outbid,
        BidStatus::Winning => database::bids::BidStatus::Winning,
        BidStatus::Won => database::bids::BidStatus::Won,
        BidStatus::Lost => database::bids::BidStatus::Lost,
        BidStatus::Cancelled => database::bids::BidStatus::Cancelled,
    }
}

pub fn bid_status_from(status: database::bids::BidStatus) -> BidStatus {
    match status {
        database::bids::BidStatus::Active => BidStatus::Active,
        database::bids::BidStatus::Outbid => BidStatus::Outbid,
        database::bids::BidStatus::Winning => BidStatus::Winning,
        database::bids::BidStatus::Won => BidStatus::Won,
        database::bids::BidStatus::Lost => BidStatus::Lost,
        database::bids::BidStatus::Cancelled => BidStatus::Cancelled,
    }
}

pub fn deposit_status_into(status: DepositStatus) -> database::deposits::DepositStatus {
    match status {
        DepositStatus::Pending => database::deposits::DepositStatus::Pending,
        DepositStatus::Paid => database::deposits::DepositStatus::Paid,
        DepositStatus::Held => database::deposits::DepositStatus::Held,
        DepositStatus::Refunded => database::deposits::DepositStatus::Refunded,
        DepositStatus::Forfeited => database::deposits::DepositStatus::Forfeited,
        DepositStatus::Applied => database::deposits::DepositStatus::Applied,
    }
}

pub fn deposit_status_from(status: database::deposits::DepositStatus) -> DepositStatus {
    match status {
        database::deposits::DepositStatus::Pending => DepositStatus::Pending,
        database::deposits::DepositStatus::Paid => DepositStatus::Paid,
        database::deposits::DepositStatus::Held => DepositStatus::Held,
        database::deposits::DepositStatus::Refunded => DepositStatus::Refunded,
        database::deposits::DepositStatus::Forfeited => DepositStatus::Forfeited,
        database::deposits::DepositStatus::Applied => DepositStatus::Applied,
    }
}

pub fn auction_into_row(auction: &Auction) -> database::auctions::Auction {
    database::auctions::Auction {
        id: auction.id,
        listing_id: auction.listing_id,
        seller_id: auction.seller_id,
        auction_type: auction_type_into(auction.auction_type),
        status: auction_status_into(auction.status),
        starting_price: auction.starting_price.clone(),
        current_price: auction.current_price.clone(),
        reserve_price: auction.reserve_price.clone(),
        buy_now_price: auction.buy_now_price.clone(),
        min_bid_increment: auction.min_bid_increment.clone(),
        start_time: auction.start_time,
        end_time: auction.end_time,
        actual_end_time: auction.actual_end_time,
        auto_extend: auction.auto_extend,
        extension_minutes: auction.extension_minutes,
        extension_threshold_minutes: auction.extension_threshold_minutes,
        max_extensions: auction.max_extensions,
        times_extended: auction.times_extended,
        requires_deposit: auction.requires_deposit,
        deposit_amount: auction.deposit_amount.clone(),
        deposit_percentage: auction.deposit_percentage.clone(),
        winner_id: auction.winner_id,
        winning_bid_id: auction.winning_bid_id,
        total_bids: auction.total_bids,
        unique_bidders: auction.unique_bidders,
        version: auction.version,
    }
}

pub fn auction_from_row(row: database::auctions::Auction) -> Auction {
    Auction {
        id: row.id,
        listing_id: row.listing_id,
        seller_id: row.seller_id,
        auction_type: auction_type_from(row.auction_type),
        status: auction_status_from(row.status),
        starting_price: row.starting_price,
        current_price: row.current_price,
        reserve_price: row.reserve_price,
        buy_now_price: row.buy_now_price,
        min_bid_increment: row.min_bid_increment,
        start_time: row.start_time,
        end_time: row.end_time,
        actual_end_time: row.actual_end_time,
        auto_extend: row.auto_extend,
        extension_minutes: row.extension_minutes,
        extension_threshold_minutes: row.extension_threshold_minutes,
        max_extensions: row.max_extensions,
        times_extended: row.times_extended,
        requires_deposit: row.requires_deposit,
        deposit_amount: row.deposit_amount,
        deposit_percentage: row.deposit_percentage,
        winner_id: row.winner_id,
        winning_bid_id: row.winning_bid_id,
        total_bids: row.total_bids,
        unique_bidders: row.unique_bidders,
        version: row.version,
    }
}

pub fn bid_into_row(bid: &Bid) -> database::bids::Bid {
    database::bids::Bid {
        id: bid.id,
        auction_id: bid.auction_id,
        bidder_id: bid.bidder_id,
        amount: bid.amount.clone(),
        previous_bid: bid.previous_bid.clone(),
        is_auto_bid: bid.is_auto_bid,
        max_auto_bid: bid.max_auto_bid.clone(),
        status: bid_status_into(bid.status),
        created_at: bid.created_at,
    }
}

pub fn bid_from_row(row: database::bids::Bid) -> Bid {
    Bid {
        id: row.id,
        auction_id: row.auction_id,
        bidder_id: row.bidder_id,
        amount: row.amount,
        previous_bid: row.previous_bid,
        is_auto_bid: row.is_auto_bid,
        max_auto_bid: row.max_auto_bid,
        status: bid_status_from(row.status),
        created_at: row.created_at,
    }
}

pub fn deposit_into_row(deposit: &Deposit) -> database::deposits::Deposit {
    database::deposits::Deposit {
        auction_id: deposit.auction_id,
        user_id: deposit.user_id,
        amount: deposit.amount.clone(),
        status: deposit_status_into(deposit.status),
        method: deposit.method.clone(),
        reference: deposit.reference.clone(),
        paid_at: deposit.paid_at,
        refunded_at: deposit.refunded_at,
        forfeited_at: deposit.forfeited_at,
        reason: deposit.reason.clone(),
    }
}

pub fn deposit_from_row(row: database::deposits::Deposit) -> Deposit {
    Deposit {
        auction_id: row.auction_id,
        user_id: row.user_id,
        amount: row.amount,
        status: deposit_status_from(row.status),
        method: row.method,
        reference: row.reference,
        paid_at: row.paid_at,
        refunded_at: row.refunded_at,
        forfeited_at: row.forfeited_at,
        reason: row.reason,
    }
}

pub fn sealed_bid_into_row(bid: &SealedBid) -> database::sealed_bids::SealedBid {
    database::sealed_bids::SealedBid {
        auction_id: bid.auction_id,
        bidder_id: bid.bidder_id,
        encrypted_amount: bid.encrypted_amount.clone(),
        nonce: bid.nonce.clone(),
        bid_hash: bid.bid_hash.clone(),
        is_revealed: bid.is_revealed,
        revealed_amount: bid.revealed_amount.clone(),
        notes: bid.notes.clone(),
        submitted_at: bid.submitted_at,
        revealed_at: bid.revealed_at,
    }
}

pub fn sealed_bid_from_row(row: database::sealed_bids::SealedBid) -> SealedBid {
    SealedBid {
        auction_id: row.auction_id,
        bidder_id: row.bidder_id,
        encrypted_amount: row.encrypted_amount,
        nonce: row.nonce,
        bid_hash: row.bid_hash,
        is_revealed: row.is_revealed,
        revealed_amount: row.revealed_amount,
        notes: row.notes,
        submitted_at: row.submitted_at,
        revealed_at: row.revealed_at,
    }
}
